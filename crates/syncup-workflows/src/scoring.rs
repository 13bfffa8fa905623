//! Pure scoring heuristics shared by the workflows.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many results the ranking helpers return.
pub const TOP_N: usize = 5;

const BONUS_INTERESTS: [&str; 6] = ["ai", "healthcare", "vision", "sports", "backend", "frontend"];
const INTEREST_BONUS: f64 = 0.25;

/// A ranked teammate suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeammateMatch {
    pub id: String,
    pub name: String,
    pub match_score: f64,
    pub complement_skills: Vec<String>,
}

/// A mentor ranked by overlap with a free-text goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorPick {
    pub id: String,
    pub name: String,
    pub score: f64,
    pub why: String,
}

/// Where the assistant sends a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Chat,
    Matchmake,
    Mentor,
}

fn lower_set<'a>(items: impl IntoIterator<Item = &'a String>) -> HashSet<String> {
    items.into_iter().map(|s| s.to_lowercase()).collect()
}

fn string_list(record: &Value, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn text_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Score a candidate by the desired skills they add that the user lacks.
///
/// Returns the score and the complementing skills (lowercased, in `desired`
/// order). Candidates whose interests hit a priority domain get a bonus.
pub fn score_teammate(
    user_skills: &[String],
    desired: &[String],
    candidate: &Value,
) -> (f64, Vec<String>) {
    let have = lower_set(user_skills);
    let offered = lower_set(&string_list(candidate, "skills"));

    let mut complement: Vec<String> = Vec::new();
    for skill in desired.iter().map(|s| s.to_lowercase()) {
        if !have.contains(&skill) && offered.contains(&skill) && !complement.contains(&skill) {
            complement.push(skill);
        }
    }

    let interests = lower_set(&string_list(candidate, "interests"));
    let bonus = if BONUS_INTERESTS.iter().any(|k| interests.contains(*k)) {
        INTEREST_BONUS
    } else {
        0.0
    };
    (complement.len() as f64 + bonus, complement)
}

/// Top teammates with a positive score, best first.
pub fn rank_teammates(
    user_skills: &[String],
    desired: &[String],
    candidates: &[Value],
) -> Vec<TeammateMatch> {
    let mut scored: Vec<TeammateMatch> = candidates
        .iter()
        .filter_map(|c| {
            let (score, complement_skills) = score_teammate(user_skills, desired, c);
            (score > 0.0).then(|| TeammateMatch {
                id: text_field(c, "id"),
                name: text_field(c, "name"),
                match_score: round2(score),
                complement_skills,
            })
        })
        .collect();
    scored.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
    scored.truncate(TOP_N);
    scored
}

/// Count the mentor's expertise terms that occur in the goal text.
pub fn score_mentor_overlap(goal: &str, mentor: &Value) -> (f64, String) {
    let goal = goal.to_lowercase();
    let hits: Vec<String> = string_list(mentor, "expertise")
        .into_iter()
        .map(|e| e.to_lowercase())
        .filter(|e| goal.contains(e.as_str()))
        .collect();
    let why = if hits.is_empty() {
        "General guidance".to_string()
    } else {
        format!("Overlaps on: {}", hits.join(", "))
    };
    (hits.len() as f64, why)
}

/// Mentors ordered by goal overlap, best first. Zero-overlap mentors are
/// kept as general guidance.
pub fn rank_mentors(goal: &str, mentors: &[Value]) -> Vec<MentorPick> {
    let mut scored: Vec<MentorPick> = mentors
        .iter()
        .map(|m| {
            let (score, why) = score_mentor_overlap(goal, m);
            MentorPick {
                id: text_field(m, "id"),
                name: text_field(m, "name"),
                score,
                why,
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(TOP_N);
    scored
}

/// Fraction of the role's skills the user already has.
pub fn skill_compatibility(user_skills: &[String], role_skills: &[String]) -> f64 {
    if role_skills.is_empty() {
        return 0.0;
    }
    let have = lower_set(user_skills);
    let matches = role_skills
        .iter()
        .filter(|s| have.contains(&s.to_lowercase()))
        .count();
    matches as f64 / role_skills.len() as f64
}

/// Availability weight. Unknown values weigh like `low`.
pub fn availability_multiplier(availability: &str) -> f64 {
    match availability.to_lowercase().as_str() {
        "high" => 1.0,
        "medium" => 0.8,
        _ => 0.6,
    }
}

/// How well a mentor covers the user's target skills, in `[0, 1]`.
///
/// Target overlap ratio plus 0.1 for every expertise term the user lacks,
/// weighted by availability.
pub fn mentor_compatibility(
    user_skills: &[String],
    expertise: &[String],
    availability: &str,
    target_skills: &[String],
) -> f64 {
    let have = lower_set(user_skills);
    let offered = lower_set(expertise);
    let target_score = if target_skills.is_empty() {
        0.0
    } else {
        let overlap = target_skills
            .iter()
            .filter(|s| offered.contains(&s.to_lowercase()))
            .count();
        overlap as f64 / target_skills.len() as f64
    };
    let gap_bonus = expertise
        .iter()
        .filter(|e| !have.contains(&e.to_lowercase()))
        .count() as f64
        * 0.1;
    ((target_score + gap_bonus) * availability_multiplier(availability)).min(1.0)
}

/// Keyword routing for the assistant.
pub fn simple_route(user_input: &str) -> Intent {
    let text = user_input.to_lowercase();
    let any = |keys: &[&str]| keys.iter().any(|k| text.contains(k));
    if any(&["team", "teammate", "match", "matchmaking", "form team"]) {
        Intent::Matchmake
    } else if any(&["mentor", "guide", "adviser", "advice on project"]) {
        Intent::Mentor
    } else {
        Intent::Chat
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
