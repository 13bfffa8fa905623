//! Career development pipeline. Each node writes its own field once and
//! later nodes only read, so a missing prerequisite stops the run.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use syncup_core::error::{Result, SyncupError};
use syncup_core::state::{State, StateUpdate};
use syncup_core::traits::{LlmClient, LookupStore};
use syncup_core::types::SearchCriteria;
use syncup_graph::{Graph, GraphBuilder, Node, NodeContext, END};

use crate::parse::{extract_object, split_csv};
use crate::require_text;
use crate::scoring::{mentor_compatibility, skill_compatibility, TOP_N};
use crate::Collaborators;

// Seed fields.
pub const USER_ID: &str = "user_id";
pub const INPUT_TYPE: &str = "input_type";
pub const INPUT_DATA: &str = "input_data";
pub const TARGET_ROLE: &str = "target_role";

// One writer each, in pipeline order.
pub const RESUME_DATA: &str = "resume_data";
pub const SKILL_PROFILE: &str = "skill_profile";
pub const LEARNING_PATH: &str = "learning_path";
pub const PORTFOLIO_PROJECTS: &str = "portfolio_projects";
pub const MENTOR_MATCHES: &str = "mentor_matches";

const DEFAULT_PROFICIENCY: u8 = 6;
const WEEKS_PER_GAP: u32 = 4;
const MAX_RESOURCES: usize = 5;
const MIN_MENTOR_SCORE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub category: String,
    pub proficiency: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub skills_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillProfile {
    pub user_id: String,
    pub skills: Vec<Skill>,
    pub experiences: Vec<Experience>,
    pub total_experience_years: f64,
}

impl SkillProfile {
    pub fn skill_names(&self) -> Vec<String> {
        self.skills.iter().map(|s| s.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningResource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_weeks: u32,
    pub difficulty: String,
    pub skills_covered: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub role: String,
    pub timeline_weeks: u32,
    pub current_skill_match: f64,
    pub milestones: Vec<String>,
    pub resources: Vec<LearningResource>,
    pub skill_gaps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioProject {
    pub title: String,
    pub description: String,
    pub tech_stack: Vec<String>,
    pub problem_statement: String,
    pub impact: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorMatch {
    pub mentor_id: String,
    pub name: String,
    pub compatibility_score: f64,
    pub matching_skills: Vec<String>,
    pub reason: String,
}

/// Build the career graph.
pub fn build(collab: &Collaborators) -> Result<Graph> {
    GraphBuilder::new("career")
        .register_node(
            "input_processor",
            InputProcessor {
                llm: collab.llm.clone(),
            },
        )
        .register_node("skill_profiler", SkillProfiler)
        .register_node(
            "learning_path",
            LearningPathPlanner {
                lookup: collab.lookup.clone(),
            },
        )
        .register_node("portfolio_builder", PortfolioBuilder)
        .register_node(
            "mentor_matcher",
            MentorMatcher {
                lookup: collab.lookup.clone(),
            },
        )
        .add_unconditional_edge("input_processor", "skill_profiler")
        .add_unconditional_edge("skill_profiler", "learning_path")
        .add_unconditional_edge("learning_path", "portfolio_builder")
        .add_unconditional_edge("portfolio_builder", "mentor_matcher")
        .add_unconditional_edge("mentor_matcher", END)
        .set_entry("input_processor")
        .build()
}

/// The resume skeleton every parsed resume is padded to.
fn resume_skeleton() -> Map<String, Value> {
    let skeleton = json!({
        "name": "",
        "email": "",
        "education": [],
        "skills": {
            "languages": [],
            "frameworks": [],
            "tools": [],
            "soft_skills": []
        },
        "projects": [],
        "experience": [],
        "certifications": [],
        "achievements": [],
        "career_summary": ""
    });
    match skeleton {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Pad a parsed resume with any missing top-level keys.
pub fn normalize_resume(mut parsed: Map<String, Value>) -> Map<String, Value> {
    for (key, default) in resume_skeleton() {
        parsed.entry(key).or_insert(default);
    }
    parsed
}

fn resume_prompt(text: &str) -> String {
    format!(
        "Parse this resume and extract structured information as JSON.\n\n\
         Resume Text:\n{text}\n\n\
         Return a JSON object with this exact structure:\n{}\n\n\
         If a field is not found, use an empty array or empty string. \
         Return ONLY the JSON object, no additional text.",
        json!({
            "name": "Full Name",
            "email": "email@example.com",
            "education": [{"degree": "Degree", "institution": "University", "year": "Year"}],
            "skills": {
                "languages": ["Python"],
                "frameworks": ["React"],
                "tools": ["Git"],
                "soft_skills": ["Communication"]
            },
            "projects": [{"title": "Project", "description": "Summary", "tech_stack": ["Tech"]}],
            "experience": [{"role": "Job Title", "organization": "Company", "skills_used": ["Skill"]}],
            "certifications": [],
            "achievements": [],
            "career_summary": "Brief professional summary"
        })
    )
}

/// Turns the raw input into `resume_data`.
pub struct InputProcessor {
    llm: Arc<dyn LlmClient>,
}

impl Node for InputProcessor {
    fn run<'a>(
        &'a self,
        state: &'a State,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let input_type = require_text(state, INPUT_TYPE)?;
            let input = require_text(state, INPUT_DATA)?;

            let resume = match input_type.as_str() {
                "resume" => {
                    let reply = self.llm.call(&resume_prompt(&input)).await?;
                    let parsed = extract_object(&reply).ok_or_else(|| {
                        SyncupError::ProviderParse("no JSON object in resume extraction reply".into())
                    })?;
                    normalize_resume(parsed)
                }
                "skills" => {
                    let mut resume = resume_skeleton();
                    resume.insert("skills".into(), json!({ "languages": split_csv(&input) }));
                    normalize_resume(resume)
                }
                other => {
                    return Err(SyncupError::node(
                        &ctx.node,
                        format!("unsupported input_type '{}' (expected resume or skills)", other),
                    ))
                }
            };

            debug!(input_type = %input_type, keys = resume.len(), "Input processed");
            Ok(StateUpdate::new()
                .set(RESUME_DATA, Value::Object(resume))
                .trace(format!("Processed {} input", input_type)))
        })
    }
}

fn strings_at(value: &Value, key: &str) -> Vec<String> {
    value
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

fn str_at(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Build a skill profile from extracted resume data.
pub fn profile_from_resume(user_id: &str, resume: &Value) -> SkillProfile {
    let mut skills: Vec<Skill> = Vec::new();
    let categories = [
        ("languages", "programming"),
        ("frameworks", "framework"),
        ("tools", "tool"),
        ("soft_skills", "soft_skill"),
    ];
    let empty = Value::Null;
    let grouped = resume.get("skills").unwrap_or(&empty);
    for (key, category) in categories {
        for name in strings_at(grouped, key) {
            if !skills.iter().any(|s| s.name.eq_ignore_ascii_case(&name)) {
                skills.push(Skill {
                    name,
                    category: category.to_string(),
                    proficiency: DEFAULT_PROFICIENCY,
                });
            }
        }
    }

    let experiences: Vec<Experience> = resume
        .get("experience")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|e| Experience {
                    title: str_at(e, &["role", "title"]),
                    company: str_at(e, &["organization", "company"]),
                    skills_used: strings_at(e, "skills_used"),
                })
                .collect()
        })
        .unwrap_or_default();

    SkillProfile {
        user_id: user_id.to_string(),
        total_experience_years: experiences.len() as f64 * 1.5,
        skills,
        experiences,
    }
}

pub struct SkillProfiler;

impl Node for SkillProfiler {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let resume: Value = state.require(RESUME_DATA)?;
            let user_id = state.get_str(USER_ID).unwrap_or("anonymous");
            let profile = profile_from_resume(user_id, &resume);
            StateUpdate::new()
                .trace(format!(
                    "Created profile with {} skills and {} experiences",
                    profile.skills.len(),
                    profile.experiences.len()
                ))
                .set_serialized(SKILL_PROFILE, &profile)
        })
    }
}

/// Plan the gap-closing path toward a role.
pub fn plan_learning_path(role: &str, user_skills: &[String], required: &[String]) -> LearningPath {
    let skill_gaps: Vec<String> = required
        .iter()
        .filter(|r| !user_skills.iter().any(|s| s.eq_ignore_ascii_case(r)))
        .cloned()
        .collect();
    let resources = skill_gaps
        .iter()
        .take(MAX_RESOURCES)
        .map(|gap| LearningResource {
            title: format!("Learn {}", gap),
            kind: "course".to_string(),
            duration_weeks: WEEKS_PER_GAP,
            difficulty: "intermediate".to_string(),
            skills_covered: vec![gap.clone()],
        })
        .collect();
    LearningPath {
        role: role.to_string(),
        timeline_weeks: skill_gaps.len() as u32 * WEEKS_PER_GAP,
        current_skill_match: skill_compatibility(user_skills, required),
        milestones: skill_gaps.iter().map(|g| format!("Master {}", g)).collect(),
        resources,
        skill_gaps,
    }
}

pub struct LearningPathPlanner {
    lookup: Arc<dyn LookupStore>,
}

impl Node for LearningPathPlanner {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let profile: SkillProfile = state.require(SKILL_PROFILE)?;
            let target = require_text(state, TARGET_ROLE)?;

            let roles = self
                .lookup
                .search(&SearchCriteria::collection("roles").with_keywords(vec![target.clone()]))
                .await?;
            let role = roles
                .iter()
                .find(|r| str_at(r, &["title"]).eq_ignore_ascii_case(&target));
            let required = match role {
                Some(r) => strings_at(r, "required_skills"),
                None => {
                    info!(role = %target, "Role not in catalogue, using generic requirements");
                    vec![
                        "programming".to_string(),
                        "problem-solving".to_string(),
                        "communication".to_string(),
                    ]
                }
            };

            let path = plan_learning_path(&target, &profile.skill_names(), &required);
            StateUpdate::new()
                .trace(format!(
                    "Learning path for {}: {} gap(s), {} resource(s)",
                    target,
                    path.skill_gaps.len(),
                    path.resources.len()
                ))
                .set_serialized(LEARNING_PATH, &path)
        })
    }
}

/// Rule-based portfolio ideas from the user's skills.
pub fn suggest_projects(user_skills: &[String]) -> Vec<PortfolioProject> {
    let has = |needle: &str| user_skills.iter().any(|s| s.to_lowercase().contains(needle));
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut projects = Vec::new();

    if has("python") {
        projects.push(PortfolioProject {
            title: "AI-Powered Data Analysis Tool".into(),
            description: "Build a web application that analyzes datasets using machine learning"
                .into(),
            tech_stack: strings(&["Python", "Streamlit", "Pandas", "Scikit-learn"]),
            problem_statement: "Data analysis is complex for non-technical users".into(),
            impact: "Democratizes data insights for business users".into(),
            category: "AI/ML".into(),
        });
    }
    if has("javascript") || has("react") {
        projects.push(PortfolioProject {
            title: "Real-time Collaboration Platform".into(),
            description: "Build a real-time collaborative workspace".into(),
            tech_stack: strings(&["React", "Node.js", "Socket.io", "MongoDB"]),
            problem_statement: "Remote teams need better collaboration tools".into(),
            impact: "Improves team productivity".into(),
            category: "Web Development".into(),
        });
    }
    projects.push(PortfolioProject {
        title: "Personal Productivity Assistant".into(),
        description: "AI-powered task management and scheduling system".into(),
        tech_stack: user_skills.iter().take(4).cloned().collect(),
        problem_statement: "People struggle with time management and productivity".into(),
        impact: "Increases personal productivity and reduces stress".into(),
        category: "Productivity".into(),
    });
    projects
}

pub struct PortfolioBuilder;

impl Node for PortfolioBuilder {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let profile: SkillProfile = state.require(SKILL_PROFILE)?;
            let projects = suggest_projects(&profile.skill_names());
            StateUpdate::new()
                .trace(format!("Generated {} portfolio project idea(s)", projects.len()))
                .set_serialized(PORTFOLIO_PROJECTS, &projects)
        })
    }
}

/// Score mentors against the learning gaps (or all skills when there are
/// no gaps), keeping those above the threshold.
pub fn match_mentors(
    profile: &SkillProfile,
    gaps: &[String],
    mentors: &[Value],
) -> Vec<MentorMatch> {
    let user_skills = profile.skill_names();
    let target: Vec<String> = if gaps.is_empty() {
        user_skills.clone()
    } else {
        gaps.to_vec()
    };

    let mut matches: Vec<MentorMatch> = mentors
        .iter()
        .filter_map(|m| {
            let expertise = strings_at(m, "expertise");
            let availability = str_at(m, &["availability"]);
            let score = mentor_compatibility(&user_skills, &expertise, &availability, &target);
            if score <= MIN_MENTOR_SCORE {
                return None;
            }
            let matching_skills: Vec<String> = expertise
                .into_iter()
                .filter(|e| target.iter().any(|t| t.eq_ignore_ascii_case(e)))
                .collect();
            let reason = if matching_skills.is_empty() {
                "Broad expertise outside your current skills".to_string()
            } else {
                let head: Vec<&str> = matching_skills.iter().take(3).map(String::as_str).collect();
                format!("Expert in {}", head.join(", "))
            };
            Some(MentorMatch {
                mentor_id: str_at(m, &["id"]),
                name: str_at(m, &["name"]),
                compatibility_score: score,
                matching_skills,
                reason,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.compatibility_score.total_cmp(&a.compatibility_score));
    matches.truncate(TOP_N);
    matches
}

pub struct MentorMatcher {
    lookup: Arc<dyn LookupStore>,
}

impl Node for MentorMatcher {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let profile: SkillProfile = state.require(SKILL_PROFILE)?;
            let gaps = state
                .get_as::<LearningPath>(LEARNING_PATH)
                .map(|p| p.skill_gaps)
                .unwrap_or_default();
            let mentors = self.lookup.search(&SearchCriteria::collection("mentors")).await?;
            let matches = match_mentors(&profile, &gaps, &mentors);
            StateUpdate::new()
                .trace(format!("Found {} mentor match(es)", matches.len()))
                .set_serialized(MENTOR_MATCHES, &matches)
        })
    }
}
