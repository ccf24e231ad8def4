use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCourse {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub instructor: String,
    pub progress: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Upcoming,
    Missing,
    Past,
}

impl AssignmentStatus {
    pub fn rank(self) -> u8 {
        match self {
            AssignmentStatus::Upcoming => 0,
            AssignmentStatus::Missing => 1,
            AssignmentStatus::Past => 2,
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStatus::Upcoming => write!(f, "upcoming"),
            AssignmentStatus::Missing => write!(f, "missing"),
            AssignmentStatus::Past => write!(f, "past"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAssignment {
    pub id: i64,
    pub title: String,
    pub due_date: String,
    pub formatted_due_date: String,
    pub course_name: String,
    pub course_id: i64,
    pub status: AssignmentStatus,
    pub score: Option<f64>,
    pub points_possible: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAnnouncement {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub posted_at: Option<String>,
    pub formatted_posted_at: String,
    pub course_name: String,
    pub course_id: Option<i64>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileSummary {
    pub name: String,
    pub initials: String,
    pub major: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatistics {
    pub gpa: String,
    pub gpa_value: Option<f64>,
    pub completed_credits: u32,
    pub upcoming_deadlines: usize,
    pub due_this_week: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessorSummary {
    pub name: String,
    pub role: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    pub course_id: i64,
    pub name: String,
    pub code: String,
    pub instructor: String,
    pub professors: Vec<ProfessorSummary>,
    pub current_grade: Option<String>,
    pub current_score: Option<f64>,
    pub upcoming: Vec<DashboardAssignment>,
    pub past: Vec<DashboardAssignment>,
    pub missing: Vec<DashboardAssignment>,
    pub announcements: Vec<DashboardAnnouncement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub profile: UserProfileSummary,
    pub courses: Vec<DashboardCourse>,
    pub assignments: Vec<DashboardAssignment>,
    pub announcements: Vec<DashboardAnnouncement>,
    pub statistics: DashboardStatistics,
    pub failed_resources: Vec<String>,
    pub from_cache: bool,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomCourseName {
    pub course_id: i64,
    pub custom_name: String,
    pub updated_at: String,
}
