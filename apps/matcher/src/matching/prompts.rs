// Prompts for the AI ranking tier.

pub const RANKING_SYSTEM: &str = "You are an early-career job matching assistant. \
    You rank job listings for one candidate based on their stated preferences. \
    You MUST respond with valid JSON only, no markdown, no commentary.";

/// Placeholders: {reference_instruction}, {max_matches}, {user_json}, {jobs_json}.
pub const RANKING_PROMPT_TEMPLATE: &str = r#"Rank the best job matches for this candidate.

{reference_instruction}

Return at most {max_matches} jobs, best first, as:
{"matches": [{"job_hash": "<hash>", "score": <0-100>, "reason": "<one sentence, addressed to the candidate>"}]}

Scoring guidance:
- Roles suitable for graduates, interns and entry-level candidates score highest.
- Prefer jobs in the candidate's target cities and career path.
- Respect language and company-type preferences when the listing makes them clear.

Candidate:
{user_json}

Jobs:
{jobs_json}
"#;
