use crate::announcements::{extract_announcements, extract_course_announcements};
use crate::format::{parse_timestamp, short_date};
use crate::grading::{clamp_progress, GradingPolicy};
use crate::payload::{
    self, parse_list, parse_object, CompleteClassData, CourseAssignment, Enrollment, Grades,
    Professor, Profile, TodoItem,
};
use crate::resource::{self, ResourceKey, ResourceMap};
use crate::types::{
    AssignmentStatus, CourseDetail, Dashboard, DashboardAssignment, DashboardCourse,
    DashboardStatistics, ProfessorSummary, UserProfileSummary,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

const DEFAULT_NAME: &str = "Student";
const DEFAULT_INITIALS: &str = "ST";
const DEFAULT_MAJOR: &str = "Undeclared";
const DUE_SOON_DAYS: i64 = 7;

/// Assemble every view model the dashboard shows.
pub fn build_dashboard(
    map: &ResourceMap,
    now: DateTime<Utc>,
    policy: &GradingPolicy,
    from_cache: bool,
) -> Dashboard {
    Dashboard {
        profile: extract_user_profile(map),
        courses: extract_courses(map, policy),
        assignments: extract_assignments(map, now),
        announcements: extract_announcements(map),
        statistics: extract_statistics(map, now, policy),
        failed_resources: resource::failed_keys(map),
        from_cache,
        generated_at: now.to_rfc3339(),
    }
}

// ---- Profile ----

pub fn extract_user_profile(map: &ResourceMap) -> UserProfileSummary {
    let profile = parse_object::<Profile>(map, &ResourceKey::Profile)
        .present()
        .or_else(|| parse_object::<Profile>(map, &ResourceKey::UserProfile).present())
        .unwrap_or_default();

    let name = non_blank(profile.name).or_else(|| non_blank(profile.short_name));
    let initials = name
        .as_deref()
        .and_then(initials)
        .unwrap_or_else(|| DEFAULT_INITIALS.to_string());
    let name = name.unwrap_or_else(|| DEFAULT_NAME.to_string());
    let major = non_blank(profile.title).unwrap_or_else(|| DEFAULT_MAJOR.to_string());

    UserProfileSummary {
        name,
        initials,
        major,
    }
}

/// First letter of the first and last words, uppercased.
fn initials(name: &str) -> Option<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let first = words.first()?.chars().next()?;
    let mut out: String = first.to_uppercase().collect();
    if words.len() > 1 {
        if let Some(last) = words.last().and_then(|w| w.chars().next()) {
            out.extend(last.to_uppercase());
        }
    }
    Some(out)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---- Grade sources ----

/// Per-course grade records from every resource that can carry them.
struct GradeSources {
    grades: HashMap<i64, Grades>,
    enrollments: HashMap<i64, Grades>,
    complete: HashMap<i64, CompleteClassData>,
}

impl GradeSources {
    fn from_map(map: &ResourceMap) -> Self {
        Self {
            grades: grades_by_course(map, &ResourceKey::Grades),
            enrollments: grades_by_course(map, &ResourceKey::Enrollments),
            complete: payload::complete_class_data(map).into_iter().collect(),
        }
    }

    fn complete_grades(&self, course_id: i64) -> Option<&Grades> {
        self.complete
            .get(&course_id)
            .and_then(|d| d.grades.as_ref())
            .filter(|g| g.has_grade())
    }

    /// Grade used for GPA and the course page: complete data, `grades`, `enrollments`.
    fn best(&self, course_id: i64) -> Option<&Grades> {
        self.complete_grades(course_id)
            .or_else(|| self.grades.get(&course_id))
            .or_else(|| self.enrollments.get(&course_id))
    }

    /// Percentage progress: a numeric score from any source, then a letter estimate.
    fn progress(&self, course_id: i64, policy: &GradingPolicy) -> u8 {
        let ordered = [
            self.grades.get(&course_id),
            self.enrollments.get(&course_id),
            self.complete_grades(course_id),
        ];
        let score = ordered.iter().flatten().find_map(|g| g.current_score);
        let estimate = || {
            ordered
                .iter()
                .flatten()
                .filter_map(|g| g.letter())
                .find_map(|letter| policy.letter_to_progress(letter))
        };
        score.or_else(estimate).map(clamp_progress).unwrap_or(0)
    }

    /// Course ids that carry any grade information, in ascending order.
    fn graded_course_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .grades
            .keys()
            .chain(self.enrollments.keys())
            .copied()
            .chain(
                self.complete
                    .keys()
                    .copied()
                    .filter(|id| self.complete_grades(*id).is_some()),
            )
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// First usable grade object per course from an enrollment-shaped list.
fn grades_by_course(map: &ResourceMap, key: &ResourceKey) -> HashMap<i64, Grades> {
    let mut out = HashMap::new();
    for enrollment in parse_list::<Enrollment>(map, key).present().unwrap_or_default() {
        let (Some(course_id), Some(grades)) = (enrollment.course_id, enrollment.grades) else {
            continue;
        };
        if grades.has_grade() {
            out.entry(course_id).or_insert(grades);
        }
    }
    out
}

// ---- Courses ----

pub fn extract_courses(map: &ResourceMap, policy: &GradingPolicy) -> Vec<DashboardCourse> {
    let sources = GradeSources::from_map(map);
    payload::course_list(map)
        .into_iter()
        .map(|course| {
            let detail = sources.complete.get(&course.id);
            let name = non_blank(course.name.clone())
                .or_else(|| detail.and_then(|d| d.course_name()).map(str::to_string))
                .unwrap_or_default();
            let code = non_blank(course.course_code.clone())
                .or_else(|| detail.and_then(|d| d.course_info.as_ref()?.code.clone()))
                .unwrap_or_default();
            let teacher = course
                .teachers
                .iter()
                .find_map(|t| non_blank(t.display_name.clone()));

            DashboardCourse {
                id: course.id,
                instructor: resolve_instructor(map, course.id, &name, detail, teacher),
                progress: sources.progress(course.id, policy),
                code,
                name,
            }
        })
        .collect()
}

fn class_professors(map: &ResourceMap, course_id: i64) -> Vec<Professor> {
    parse_list::<Professor>(map, &ResourceKey::class_professors(course_id))
        .present()
        .unwrap_or_default()
}

fn first_named(professors: &[Professor]) -> Option<String> {
    professors.iter().find_map(|p| non_blank(p.name.clone()))
}

fn resolve_instructor(
    map: &ResourceMap,
    course_id: i64,
    course_name: &str,
    detail: Option<&CompleteClassData>,
    teacher: Option<String>,
) -> String {
    if let Some(name) = first_named(&class_professors(map, course_id)) {
        return name;
    }
    if let Some(name) = detail.and_then(|d| first_named(&d.professors)) {
        return name;
    }
    if let Some(name) = teacher {
        return name;
    }
    match detail {
        Some(_) => format!("{course_name} Instructor"),
        None => String::new(),
    }
}

/// Overlay user-chosen names onto extracted courses.
pub fn apply_custom_names(courses: &mut [DashboardCourse], names: &HashMap<i64, String>) {
    for course in courses.iter_mut() {
        if let Some(custom) = names.get(&course.id).filter(|n| !n.trim().is_empty()) {
            course.name = custom.clone();
        }
    }
}

// ---- Assignments ----

/// Assignments from every course's complete data, upcoming first, then by due date.
/// Without any complete data the to-do list supplies the items; those already past
/// `now` count as missing.
pub fn extract_assignments(map: &ResourceMap, now: DateTime<Utc>) -> Vec<DashboardAssignment> {
    let complete = payload::complete_class_data(map);
    let mut items = if complete.is_empty() {
        todo_assignments(map, now)
    } else {
        let names = payload::course_name_index(map);
        complete
            .iter()
            .flat_map(|(course_id, data)| {
                let course_name = names.get(course_id).cloned().unwrap_or_default();
                course_assignments(*course_id, &course_name, data)
            })
            .collect()
    };
    sort_assignments(&mut items);
    items
}

fn course_assignments(
    course_id: i64,
    course_name: &str,
    data: &CompleteClassData,
) -> Vec<DashboardAssignment> {
    let Some(buckets) = &data.assignments else {
        return Vec::new();
    };
    let tagged = [
        (AssignmentStatus::Upcoming, &buckets.upcoming),
        (AssignmentStatus::Missing, &buckets.missing),
        (AssignmentStatus::Past, &buckets.past),
    ];
    tagged
        .into_iter()
        .flat_map(|(status, list)| {
            list.iter()
                .filter_map(move |a| assignment_view(a, status, course_id, course_name))
        })
        .collect()
}

fn assignment_view(
    a: &CourseAssignment,
    status: AssignmentStatus,
    course_id: i64,
    course_name: &str,
) -> Option<DashboardAssignment> {
    let title = non_blank(a.name.clone())?;
    let due_date = non_blank(a.due_date.clone())?;
    Some(DashboardAssignment {
        id: a.id.unwrap_or_default(),
        title,
        formatted_due_date: format_due(&due_date),
        due_date,
        course_name: course_name.to_string(),
        course_id,
        status,
        score: a.score,
        points_possible: a.points_possible,
    })
}

fn todo_assignments(map: &ResourceMap, now: DateTime<Utc>) -> Vec<DashboardAssignment> {
    let names = payload::course_name_index(map);
    parse_list::<TodoItem>(map, &ResourceKey::Todo)
        .present()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let assignment = item.assignment?;
            let title = non_blank(assignment.name)?;
            let due_date = non_blank(assignment.due_at)?;
            let course_id = assignment.course_id.or(item.course_id).unwrap_or_default();
            let course_name = non_blank(item.context_name)
                .or_else(|| names.get(&course_id).cloned())
                .unwrap_or_default();
            let status = match parse_timestamp(&due_date) {
                Some(due) if due <= now => AssignmentStatus::Missing,
                _ => AssignmentStatus::Upcoming,
            };
            Some(DashboardAssignment {
                id: assignment.id,
                title,
                formatted_due_date: format_due(&due_date),
                due_date,
                course_name,
                course_id,
                status,
                score: None,
                points_possible: assignment.points_possible,
            })
        })
        .collect()
}

fn format_due(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| short_date(&dt))
        .unwrap_or_else(|| raw.to_string())
}

/// Status rank, then ascending due date; unparseable dates trail within their status.
fn sort_assignments(items: &mut [DashboardAssignment]) {
    items.sort_by_key(|a| {
        let due = parse_timestamp(&a.due_date);
        (a.status.rank(), due.is_none(), due)
    });
}

// ---- Statistics ----

pub fn extract_statistics(
    map: &ResourceMap,
    now: DateTime<Utc>,
    policy: &GradingPolicy,
) -> DashboardStatistics {
    let sources = GradeSources::from_map(map);
    let points: Vec<f64> = sources
        .graded_course_ids()
        .into_iter()
        .filter_map(|id| sources.best(id).and_then(|g| policy.grade_points(g)))
        .collect();

    let gpa_value = if points.is_empty() {
        None
    } else {
        Some(points.iter().sum::<f64>() / points.len() as f64)
    };
    let passed = points.iter().filter(|p| policy.is_passing(**p)).count() as u32;

    let upcoming: Vec<DashboardAssignment> = extract_assignments(map, now)
        .into_iter()
        .filter(|a| a.status == AssignmentStatus::Upcoming)
        .collect();
    let week_end = now + Duration::days(DUE_SOON_DAYS);
    let due_this_week = upcoming
        .iter()
        .filter_map(|a| parse_timestamp(&a.due_date))
        .filter(|due| *due > now && *due <= week_end)
        .count();

    DashboardStatistics {
        gpa: format!("{:.2}", gpa_value.unwrap_or(0.0)),
        gpa_value,
        completed_credits: passed * policy.credits_per_course,
        upcoming_deadlines: upcoming.len(),
        due_this_week,
    }
}

// ---- Course detail ----

/// Everything known about one course, or `None` when the map has never heard of it.
pub fn extract_course_detail(
    map: &ResourceMap,
    course_id: i64,
    now: DateTime<Utc>,
    policy: &GradingPolicy,
) -> Option<CourseDetail> {
    let course = payload::course_list(map).into_iter().find(|c| c.id == course_id);
    let detail_present =
        parse_object::<CompleteClassData>(map, &ResourceKey::course_detail(course_id)).is_present();
    if course.is_none() && !detail_present {
        return None;
    }

    let dashboard_course = extract_courses(map, policy)
        .into_iter()
        .find(|c| c.id == course_id);
    let sources = GradeSources::from_map(map);
    let data = sources.complete.get(&course_id);

    let name = dashboard_course
        .as_ref()
        .map(|c| c.name.clone())
        .filter(|n| !n.is_empty())
        .or_else(|| data.and_then(|d| d.course_name()).map(str::to_string))
        .unwrap_or_default();
    let code = dashboard_course
        .as_ref()
        .map(|c| c.code.clone())
        .filter(|c| !c.is_empty())
        .or_else(|| data.and_then(|d| d.course_info.as_ref()?.code.clone()))
        .unwrap_or_default();
    let instructor = match &dashboard_course {
        Some(c) => c.instructor.clone(),
        None => resolve_instructor(map, course_id, &name, data, None),
    };

    let mut professors = class_professors(map, course_id);
    if professors.is_empty() {
        professors = data.map(|d| d.professors.clone()).unwrap_or_default();
    }
    let professors = professors
        .into_iter()
        .filter_map(|p| {
            Some(ProfessorSummary {
                name: non_blank(p.name)?,
                role: non_blank(p.role),
                email: non_blank(p.email),
            })
        })
        .collect();

    let grades = sources.best(course_id);
    let mut assignments: Vec<DashboardAssignment> = extract_assignments(map, now)
        .into_iter()
        .filter(|a| a.course_id == course_id)
        .collect();
    for a in assignments.iter_mut() {
        if a.course_name.is_empty() {
            a.course_name = name.clone();
        }
    }
    let (mut upcoming, mut past, mut missing) = (Vec::new(), Vec::new(), Vec::new());
    for a in assignments {
        match a.status {
            AssignmentStatus::Upcoming => upcoming.push(a),
            AssignmentStatus::Past => past.push(a),
            AssignmentStatus::Missing => missing.push(a),
        }
    }

    Some(CourseDetail {
        course_id,
        current_grade: grades.and_then(|g| g.letter()).map(str::to_string),
        current_score: grades.and_then(|g| g.current_score),
        announcements: extract_course_announcements(map, course_id),
        name,
        code,
        instructor,
        professors,
        upcoming,
        past,
        missing,
    })
}
