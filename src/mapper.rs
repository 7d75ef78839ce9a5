//! Pure mapping from a source assignment to a task-creation request.
//! No I/O happens here; the coordinator owns fetching and writing.

use chrono::{DateTime, Utc};

use crate::clients::{Assignment, TaskRequest};

/// Point-value thresholds for priority tiers. Strictly-greater-than
/// comparisons: an assignment worth exactly `highest` points lands in
/// the next tier down.
#[derive(Debug, Clone)]
pub struct PriorityTiers {
    pub highest: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for PriorityTiers {
    fn default() -> Self {
        Self {
            highest: 50.0,
            high: 25.0,
            medium: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// When set, assignments without a due date are skipped entirely.
    pub require_due_date: bool,
    pub tiers: PriorityTiers,
    /// Fixed label stamped on every created task, so engine-generated
    /// tasks can be found again for dedup or cleanup.
    pub marker_label: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            require_due_date: false,
            tiers: PriorityTiers::default(),
            marker_label: "coursesync".to_string(),
        }
    }
}

/// Map one assignment (plus optional course display name) to a task
/// request, or `None` when the assignment should not produce a task.
pub fn map_assignment(
    assignment: &Assignment,
    course_name: Option<&str>,
    config: &MapperConfig,
) -> Option<TaskRequest> {
    // Already handed in: creating a task would only duplicate work the
    // student has finished.
    if assignment
        .submission
        .as_ref()
        .and_then(|s| s.submitted_at.as_deref())
        .is_some()
    {
        return None;
    }

    let due_date = assignment.due_at.as_deref().and_then(normalize_due_date);
    if config.require_due_date && due_date.is_none() {
        return None;
    }

    let content = match course_name {
        Some(course) => format!("[{course}] {}", assignment.name),
        None => assignment.name.clone(),
    };

    Some(TaskRequest {
        content,
        due_date,
        priority: Some(priority_for(assignment.points_possible, &config.tiers)),
        labels: vec![config.marker_label.clone()],
        project_id: None,
        description: description_for(assignment),
    })
}

/// Calendar-date portion of the provider's UTC timestamp. Unparseable
/// input degrades to "no due date" instead of failing the item.
fn normalize_due_date(due_at: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(due_at).ok()?;
    Some(
        parsed
            .with_timezone(&Utc)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string(),
    )
}

/// Priority ordinal, 1 (default) through 4 (highest), from the point
/// value. Missing points fall to the default tier.
fn priority_for(points: Option<f64>, tiers: &PriorityTiers) -> u8 {
    match points {
        Some(p) if p > tiers.highest => 4,
        Some(p) if p > tiers.high => 3,
        Some(p) if p > tiers.medium => 2,
        _ => 1,
    }
}

/// Detail URL first, then the assignment's free-text body, so the sink
/// task keeps provenance back to the source record.
fn description_for(assignment: &Assignment) -> Option<String> {
    match (
        assignment.html_url.as_deref(),
        assignment.description.as_deref().filter(|d| !d.is_empty()),
    ) {
        (Some(url), Some(body)) => Some(format!("{url}\n\n{body}")),
        (Some(url), None) => Some(url.to_string()),
        (None, Some(body)) => Some(body.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Submission;

    fn assignment(name: &str) -> Assignment {
        Assignment {
            id: 1,
            name: name.to_string(),
            due_at: None,
            points_possible: None,
            html_url: None,
            description: None,
            submission: None,
        }
    }

    #[test]
    fn skips_submitted_assignments() {
        let mut a = assignment("HW1");
        a.submission = Some(Submission {
            submitted_at: Some("2024-01-01T00:00:00Z".to_string()),
        });
        assert!(map_assignment(&a, None, &MapperConfig::default()).is_none());
    }

    #[test]
    fn unsubmitted_submission_object_is_not_a_skip() {
        let mut a = assignment("HW1");
        a.submission = Some(Submission { submitted_at: None });
        assert!(map_assignment(&a, None, &MapperConfig::default()).is_some());
    }

    #[test]
    fn normalizes_due_date_to_utc_calendar_date() {
        let mut a = assignment("HW1");
        a.due_at = Some("2024-03-15T23:59:00Z".to_string());
        let req = map_assignment(&a, None, &MapperConfig::default()).unwrap();
        assert_eq!(req.due_date.as_deref(), Some("2024-03-15"));
    }

    #[test]
    fn due_date_offset_converts_to_utc() {
        // 01:30 on the 16th in +09:00 is still the 15th in UTC.
        let mut a = assignment("HW1");
        a.due_at = Some("2024-03-16T01:30:00+09:00".to_string());
        let req = map_assignment(&a, None, &MapperConfig::default()).unwrap();
        assert_eq!(req.due_date.as_deref(), Some("2024-03-15"));
    }

    #[test]
    fn unparseable_due_date_degrades_to_none() {
        let mut a = assignment("HW1");
        a.due_at = Some("next tuesday".to_string());
        let req = map_assignment(&a, None, &MapperConfig::default()).unwrap();
        assert!(req.due_date.is_none());
    }

    #[test]
    fn require_due_date_policy_skips_undated() {
        let config = MapperConfig {
            require_due_date: true,
            ..MapperConfig::default()
        };
        assert!(map_assignment(&assignment("HW1"), None, &config).is_none());

        let mut dated = assignment("HW2");
        dated.due_at = Some("2024-03-15T23:59:00Z".to_string());
        assert!(map_assignment(&dated, None, &config).is_some());
    }

    #[test]
    fn content_includes_course_name_when_known() {
        let a = assignment("HW1");
        let config = MapperConfig::default();
        let named = map_assignment(&a, Some("Biology"), &config).unwrap();
        assert_eq!(named.content, "[Biology] HW1");
        let unnamed = map_assignment(&a, None, &config).unwrap();
        assert_eq!(unnamed.content, "HW1");
    }

    #[test]
    fn priority_tiers_use_strict_greater_than() {
        let tiers = PriorityTiers::default();
        assert_eq!(priority_for(Some(60.0), &tiers), 4);
        assert_eq!(priority_for(Some(50.0), &tiers), 3); // not > 50
        assert_eq!(priority_for(Some(30.0), &tiers), 3);
        assert_eq!(priority_for(Some(25.0), &tiers), 2);
        assert_eq!(priority_for(Some(15.0), &tiers), 2);
        assert_eq!(priority_for(Some(10.0), &tiers), 1);
        assert_eq!(priority_for(Some(3.0), &tiers), 1);
        assert_eq!(priority_for(None, &tiers), 1);
    }

    #[test]
    fn description_carries_url_then_body() {
        let mut a = assignment("HW1");
        a.html_url = Some("https://lms.example.edu/a/1".to_string());
        a.description = Some("Read chapter 4.".to_string());
        let req = map_assignment(&a, None, &MapperConfig::default()).unwrap();
        assert_eq!(
            req.description.as_deref(),
            Some("https://lms.example.edu/a/1\n\nRead chapter 4.")
        );
    }

    #[test]
    fn marker_label_always_present() {
        let req = map_assignment(&assignment("HW1"), None, &MapperConfig::default()).unwrap();
        assert_eq!(req.labels, vec!["coursesync".to_string()]);
    }
}
