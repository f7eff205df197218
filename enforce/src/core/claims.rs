//! Parallel-claim extraction from user prompts.
//!
//! Advisory only: the count is stored with the turn so later checks can compare
//! it with observed delegate calls. Every pattern is anchored on an explicit
//! parallelism keyword so bare numerals ("Phase 4") never produce a claim.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

/// Accepted range for a claimed parallel count.
pub const CLAIM_BOUNDS: RangeInclusive<u32> = 2..=100;

const CLAIM_PATTERNS: &[&str] = &[
    // "5 个并行任务", "啟動 5 個並行", "3 个同时运行"
    r"([0-9]+)\s*(?:(?:个|個|项|項|路)?\s*(?:并行|並行)|(?:个|個|项|項|路)\s*(?:同时|同時))",
    // "并行启动 5 个", "同時執行 3"
    r"(?:并行|並行|同时|同時)\s*(?:启动|啟動|运行|運行|执行|執行|跑)?\s*([0-9]+)",
    // "5 parallel agents"
    r"(?i)\b([0-9]+)\s+(?:parallel|concurrent|simultaneous)\b",
    // "spawning 5 agents in parallel"
    r"(?i)\b(?:spawn|spawning|launch|launching|run|running|start|starting|dispatch|dispatching)\s+([0-9]+)\s+(?:[a-z-]+\s+){0,3}?(?:in\s+parallel|concurrently|simultaneously|at\s+once)\b",
    // "in parallel across 4 workers"
    r"(?i)\bin\s+parallel\s+(?:with|using|across|over)\s+([0-9]+)\b",
    // "parallelism: 6"
    r"(?i)\bparallel(?:ism)?\s*[:=]\s*([0-9]+)\b",
];

static CLAIM_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CLAIM_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("claim pattern is valid"))
        .collect()
});

/// Return the parallel count the prompt claims, if any.
///
/// Patterns are tried in order and the first captured integer decides: a value
/// outside [`CLAIM_BOUNDS`] yields `None` rather than falling through.
pub fn extract_parallel_claim(text: &str) -> Option<u32> {
    let captured = CLAIM_RES
        .iter()
        .find_map(|re| re.captures(text).and_then(|caps| caps.get(1)))?;
    let count = captured.as_str().parse::<u32>().ok()?;
    CLAIM_BOUNDS.contains(&count).then_some(count)
}
