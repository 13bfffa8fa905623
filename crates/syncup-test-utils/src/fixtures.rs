use serde_json::{json, Value};

use crate::lookup::MemoryLookup;

/// Candidate teammates.
pub fn users() -> Vec<Value> {
    vec![
        json!({
            "id": "u1",
            "name": "Aarav",
            "skills": ["Python", "FastAPI", "PostgreSQL"],
            "interests": ["backend", "healthcare"]
        }),
        json!({
            "id": "u2",
            "name": "Isha",
            "skills": ["React", "Figma", "TypeScript"],
            "interests": ["frontend"]
        }),
        json!({
            "id": "u3",
            "name": "Kabir",
            "skills": ["PyTorch", "Computer Vision", "Python"],
            "interests": ["ai", "vision"]
        }),
        json!({
            "id": "u4",
            "name": "Meera",
            "skills": ["Excel"],
            "interests": ["finance"]
        }),
    ]
}

/// Mentor directory.
pub fn mentors() -> Vec<Value> {
    vec![
        json!({
            "id": "m1",
            "name": "Dr. Rao",
            "expertise": ["Machine Learning", "Healthcare", "Python"],
            "availability": "high",
            "rating": 4.8,
            "bio": "Clinical ML researcher"
        }),
        json!({
            "id": "m2",
            "name": "Sana",
            "expertise": ["React", "TypeScript", "Design Systems"],
            "availability": "medium",
            "rating": 4.5,
            "bio": "Frontend lead"
        }),
        json!({
            "id": "m3",
            "name": "Vikram",
            "expertise": ["Docker", "Kubernetes"],
            "availability": "low",
            "rating": 4.1,
            "bio": "Platform engineer"
        }),
    ]
}

/// Career roles.
pub fn roles() -> Vec<Value> {
    vec![
        json!({
            "title": "ML Engineer",
            "required_skills": ["Python", "Machine Learning", "Docker", "SQL"],
            "preferred_skills": ["Kubernetes"],
            "experience_level": "mid",
            "description": "Builds and ships ML systems"
        }),
        json!({
            "title": "Frontend Developer",
            "required_skills": ["JavaScript", "React", "CSS"],
            "preferred_skills": ["TypeScript"],
            "experience_level": "entry",
            "description": "Builds web interfaces"
        }),
    ]
}

/// Lookup store holding `users`, `mentors`, and `roles`.
pub fn fixture_lookup() -> MemoryLookup {
    MemoryLookup::new()
        .with_collection("users", users())
        .with_collection("mentors", mentors())
        .with_collection("roles", roles())
}
