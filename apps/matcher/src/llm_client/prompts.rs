// Shared prompt fragments. Each service that needs LLM calls defines its own
// prompts.rs alongside it; this file holds the cross-cutting pieces.

/// Instruction appended to every ranking prompt so references can be validated.
pub const REFERENCE_INSTRUCTION: &str = "\
    CRITICAL: Refer to jobs ONLY by the exact `job_hash` values provided. \
    Do NOT invent, shorten, or reformat job hashes. \
    Every job you return must appear in the provided list, at most once.";
