//! GPU snapshot data model and canonicalization (§3, §4.12).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuProcess {
    pub pid: u32,
    pub name: String,
    pub vram_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuSnapshot {
    pub vram_total_mb: u64,
    pub vram_used_mb: u64,
    pub processes: Vec<GpuProcess>,
}

/// Canonicalizes a raw snapshot fetched from upstream: drops zero-VRAM
/// processes, and substitutes any generic "ollama" process name with the
/// actual loaded model name, assigned in positional order against
/// `loaded_models` (§3, §4.12, §8 invariant: no zero-VRAM processes survive).
pub fn canonicalize(mut snapshot: GpuSnapshot, loaded_models: &[String]) -> GpuSnapshot {
    snapshot.processes.retain(|p| p.vram_mb > 0);

    let mut model_iter = loaded_models.iter();
    for process in &mut snapshot.processes {
        if process.name.eq_ignore_ascii_case("ollama") {
            if let Some(model) = model_iter.next() {
                process.name = model.clone();
            }
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_zero_vram_processes() {
        let snap = GpuSnapshot {
            vram_total_mb: 1000,
            vram_used_mb: 200,
            processes: vec![
                GpuProcess { pid: 1, name: "ollama".into(), vram_mb: 200 },
                GpuProcess { pid: 2, name: "idle".into(), vram_mb: 0 },
            ],
        };
        let out = canonicalize(snap, &["llama3".to_string()]);
        assert_eq!(out.processes.len(), 1);
        assert_eq!(out.processes[0].name, "llama3");
    }

    #[test]
    fn substitutes_names_in_positional_order() {
        let snap = GpuSnapshot {
            vram_total_mb: 1000,
            vram_used_mb: 400,
            processes: vec![
                GpuProcess { pid: 1, name: "ollama".into(), vram_mb: 200 },
                GpuProcess { pid: 2, name: "ollama".into(), vram_mb: 200 },
            ],
        };
        let out = canonicalize(snap, &["modelA".to_string(), "modelB".to_string()]);
        assert_eq!(out.processes[0].name, "modelA");
        assert_eq!(out.processes[1].name, "modelB");
    }
}
