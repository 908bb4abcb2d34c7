use crate::bytecode::op::Opcode;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Collects per-opcode execution counts and wall time for one run.
#[derive(Debug, Clone)]
pub struct Profiler {
    counts: [u64; Opcode::ALL.len()],
    total: u64,
    started: Option<Instant>,
    elapsed: Duration,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Profiler {
            counts: [0; Opcode::ALL.len()],
            total: 0,
            started: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed += started.elapsed();
        }
    }

    #[inline]
    pub fn record(&mut self, opcode: Opcode) {
        self.counts[opcode as usize] += 1;
        self.total += 1;
    }

    pub fn count(&self, opcode: Opcode) -> u64 {
        self.counts[opcode as usize]
    }

    pub fn total_instructions(&self) -> u64 {
        self.total
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Snapshot with opcodes ordered by descending count; unused opcodes are
    /// left out.
    pub fn report(&self) -> ProfileReport {
        let mut opcodes: Vec<OpcodeCount> = Opcode::ALL
            .iter()
            .filter(|op| self.count(**op) > 0)
            .map(|op| OpcodeCount {
                opcode: *op,
                count: self.count(*op),
            })
            .collect();
        opcodes.sort_by(|a, b| b.count.cmp(&a.count).then(a.opcode.cmp(&b.opcode)));

        ProfileReport {
            total_instructions: self.total,
            elapsed_ms: self.elapsed.as_secs_f64() * 1000.0,
            opcodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpcodeCount {
    pub opcode: Opcode,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    pub total_instructions: u64,
    pub elapsed_ms: f64,
    pub opcodes: Vec<OpcodeCount>,
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Profiler Statistics ===")?;
        writeln!(f, "Total instructions: {}", self.total_instructions)?;
        writeln!(f, "Elapsed time: {:.3} ms", self.elapsed_ms)?;
        writeln!(f, "Opcode counts:")?;
        for entry in &self.opcodes {
            writeln!(f, "  {:<13}{}", entry.opcode.name(), entry.count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_order() {
        let mut p = Profiler::new();
        p.record(Opcode::Load);
        p.record(Opcode::Add);
        p.record(Opcode::Load);

        let report = p.report();
        assert_eq!(report.total_instructions, 3);
        assert_eq!(report.opcodes[0].opcode, Opcode::Load);
        assert_eq!(report.opcodes[0].count, 2);
        assert_eq!(report.opcodes.len(), 2);
    }

    #[test]
    fn test_report_serializes() {
        let mut p = Profiler::new();
        p.record(Opcode::Print);
        let json = serde_json::to_value(p.report()).unwrap();
        assert_eq!(json["total_instructions"], 1);
        assert_eq!(json["opcodes"][0]["opcode"], "PRINT");
    }

    #[test]
    fn test_reset() {
        let mut p = Profiler::new();
        p.record(Opcode::Pop);
        p.reset();
        assert_eq!(p.total_instructions(), 0);
        assert!(p.report().to_string().contains("Total instructions: 0"));
    }
}
