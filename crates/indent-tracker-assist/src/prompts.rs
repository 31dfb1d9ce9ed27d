//! Prompt templates and fixed replies.
//!
//! Prompts are in Malay to match the pharmacy staff who read the output.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// System instruction sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "Anda adalah pembantu pintar Farmasi Hospital. \
Berikan respon dalam Bahasa Melayu yang profesional, ringkas, dan tepat.";

/// Shown when a ready notification could not be generated.
pub const NOTIFY_FALLBACK: &str = "Gagal menjana mesej.";

/// Shown when the workload summary could not be generated.
pub const WORKLOAD_FALLBACK: &str = "Gagal membuat analisis.";

/// Shown when the service answered without any text.
pub const EMPTY_REPLY: &str = "Tiada respon.";

/// Draft a short WhatsApp message telling ward staff an indent is ready.
pub fn make_notify_prompt(ward: &str, category: &str, unit: &str) -> String {
    format!(
        "Jana satu draf mesej WhatsApp pendek untuk memberitahu staf wad ubat sudah siap. \n    \
         Detail: Wad {ward}, Jenis: {category}, Unit: {unit}. \
         Sila pastikan mesej berbunyi profesional."
    )
}

/// Summarize which unit is busiest, given indent counts per unit.
pub fn make_workload_prompt(counts: &BTreeMap<String, usize>) -> String {
    let stats: Map<String, Value> = counts
        .iter()
        .map(|(unit, count)| (unit.clone(), Value::from(*count)))
        .collect();
    format!(
        "Analisis data beban kerja farmasi ini: {}. \
         Berikan ringkasan unit mana paling sibuk dan cadangan aliran kerja harian.",
        Value::Object(stats)
    )
}
