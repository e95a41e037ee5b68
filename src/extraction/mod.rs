pub mod answer;
pub mod base;
pub mod search_result;

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::RawEventCandidate;

pub fn summary_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "startDate": { "type": "string", "description": "YYYY-MM-DD" },
            "endDate": { "type": "string", "description": "YYYY-MM-DD (optional)" },
            "location": { "type": "string", "description": "venue + city, state" },
            "targetAudience": { "type": "string", "description": "e.g. all ages, families, adults" },
            "summary": { "type": "string", "description": "1-2 sentences" }
        }
    })
}

pub fn candidates_from_search(results: &[Value], today: NaiveDate) -> Vec<RawEventCandidate> {
    results
        .iter()
        .map(|result| search_result::extract_candidate(result, today))
        .collect()
}
