use crate::payload::Grades;

/// Standard 4.0 scale.
const LETTER_POINTS: &[(&str, f64)] = &[
    ("A+", 4.0),
    ("A", 4.0),
    ("A-", 3.7),
    ("B+", 3.3),
    ("B", 3.0),
    ("B-", 2.7),
    ("C+", 2.3),
    ("C", 2.0),
    ("C-", 1.7),
    ("D+", 1.3),
    ("D", 1.0),
    ("D-", 0.7),
    ("F", 0.0),
];

/// Minimum percentage → grade points, highest breakpoint first.
const SCORE_BREAKPOINTS: &[(f64, f64)] = &[
    (93.0, 4.0),
    (90.0, 3.7),
    (87.0, 3.3),
    (83.0, 3.0),
    (80.0, 2.7),
    (77.0, 2.3),
    (73.0, 2.0),
    (70.0, 1.7),
    (67.0, 1.3),
    (63.0, 1.0),
    (60.0, 0.7),
];

/// Letter grade → estimated percentage, used for progress when no score exists.
const LETTER_PROGRESS: &[(&str, f64)] = &[
    ("A+", 100.0),
    ("A", 95.0),
    ("A-", 90.0),
    ("B+", 87.0),
    ("B", 85.0),
    ("B-", 80.0),
    ("C+", 77.0),
    ("C", 75.0),
    ("C-", 70.0),
    ("D+", 67.0),
    ("D", 65.0),
    ("D-", 60.0),
    ("F", 50.0),
];

#[derive(Debug, Clone)]
pub struct GradingPolicy {
    pub letter_points: Vec<(String, f64)>,
    pub score_breakpoints: Vec<(f64, f64)>,
    pub letter_progress: Vec<(String, f64)>,
    pub credits_per_course: u32,
    /// Grade points at or above which a course counts toward completed credits (D-).
    pub passing_points: f64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            letter_points: LETTER_POINTS.iter().map(|(l, p)| (l.to_string(), *p)).collect(),
            score_breakpoints: SCORE_BREAKPOINTS.to_vec(),
            letter_progress: LETTER_PROGRESS.iter().map(|(l, p)| (l.to_string(), *p)).collect(),
            credits_per_course: 3,
            passing_points: 0.7,
        }
    }
}

impl GradingPolicy {
    /// Grade points for a letter grade. Unknown letters fall back to their first
    /// character (A/B/C/D/F); anything else is not a grade.
    pub fn letter_to_points(&self, letter: &str) -> Option<f64> {
        let letter = letter.trim().to_uppercase();
        if letter.is_empty() {
            return None;
        }
        if let Some((_, points)) = self.letter_points.iter().find(|(l, _)| *l == letter) {
            return Some(*points);
        }
        match letter.chars().next()? {
            'A' => Some(4.0),
            'B' => Some(3.0),
            'C' => Some(2.0),
            'D' => Some(1.0),
            'F' => Some(0.0),
            _ => None,
        }
    }

    pub fn score_to_points(&self, score: f64) -> f64 {
        self.score_breakpoints
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, points)| *points)
            .unwrap_or(0.0)
    }

    /// Letter grade first, then numeric score. `None` when neither yields a grade.
    pub fn grade_points(&self, grades: &Grades) -> Option<f64> {
        grades
            .letter()
            .and_then(|letter| self.letter_to_points(letter))
            .or_else(|| grades.current_score.map(|s| self.score_to_points(s)))
    }

    pub fn letter_to_progress(&self, letter: &str) -> Option<f64> {
        let letter = letter.trim().to_uppercase();
        self.letter_progress
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, p)| *p)
    }

    pub fn is_passing(&self, points: f64) -> bool {
        points >= self.passing_points
    }
}

/// Round and clamp a percentage into 0..=100.
pub fn clamp_progress(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}
