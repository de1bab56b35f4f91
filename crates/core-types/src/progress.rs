use crate::error::CoreError;
use crate::lesson::{Lesson, LessonId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// A `(level, lesson)` position in the curriculum, as it appears in a lesson route.
///
/// The derived ordering is lexicographic, which is the order in which a learner
/// moves through the curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteTarget {
    pub level: u32,
    pub lesson: u32,
}

impl RouteTarget {
    pub fn new(level: u32, lesson: u32) -> Self {
        Self { level, lesson }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/learn/{}/{}", self.level, self.lesson)
    }
}

/// A learner's progress as held by the progress store.
///
/// `level`/`lesson` form the furthest position reached; `completed_lesson_ids`
/// holds the lessons whose gate has been passed. Both only ever grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub level: u32,
    pub lesson: u32,
    #[serde(default)]
    pub completed_lesson_ids: BTreeSet<LessonId>,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self::new_learner()
    }
}

impl ProgressRecord {
    /// The record created for a learner the first time they are registered.
    pub fn new_learner() -> Self {
        Self {
            level: 0,
            lesson: 1,
            completed_lesson_ids: BTreeSet::new(),
        }
    }

    pub fn new(level: u32, lesson: u32, completed: impl IntoIterator<Item = LessonId>) -> Self {
        Self {
            level,
            lesson,
            completed_lesson_ids: completed.into_iter().collect(),
        }
    }

    /// The furthest position reached. A stored lesson of 0 is read as page 1.
    pub fn pointer(&self) -> RouteTarget {
        RouteTarget::new(self.level, self.lesson.max(1))
    }

    pub fn is_completed(&self, id: LessonId) -> bool {
        self.completed_lesson_ids.contains(&id)
    }

    /// A lesson is visited once the pointer has reached it, whether or not its gate was passed.
    pub fn is_visited(&self, lesson: &Lesson) -> bool {
        lesson.level < self.level || (lesson.level == self.level && lesson.page_number <= self.pointer().lesson)
    }

    /// Combines two views of the same learner without losing anything either one knows.
    ///
    /// Completions are unioned and the pointer is the furthest of the two.
    pub fn merged_with(&self, other: &ProgressRecord) -> ProgressRecord {
        let pointer = self.pointer().max(other.pointer());
        ProgressRecord {
            level: pointer.level,
            lesson: pointer.lesson,
            completed_lesson_ids: self
                .completed_lesson_ids
                .union(&other.completed_lesson_ids)
                .copied()
                .collect(),
        }
    }

    /// True when `self` knows something `other` does not.
    pub fn is_ahead_of(&self, other: &ProgressRecord) -> bool {
        self.pointer() > other.pointer() || !self.completed_lesson_ids.is_subset(&other.completed_lesson_ids)
    }
}

/// Normalizes the `completed_lessons` field as it arrives over the wire.
///
/// Accepts `null`, an array of integers or integer strings, or a string holding
/// a JSON-encoded array. The result is de-duplicated and sorted.
pub fn parse_completed_lessons(raw: &Value) -> Result<BTreeSet<LessonId>, CoreError> {
    match raw {
        Value::Null => Ok(BTreeSet::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => n
                    .as_i64()
                    .map(LessonId)
                    .ok_or_else(|| CoreError::InvalidCompletedLessons(format!("not an integer id: {}", n))),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(LessonId)
                    .map_err(|_| CoreError::InvalidCompletedLessons(format!("not an integer id: {:?}", s))),
                other => Err(CoreError::InvalidCompletedLessons(format!("unexpected entry: {}", other))),
            })
            .collect(),
        Value::String(s) if s.trim().is_empty() => Ok(BTreeSet::new()),
        Value::String(s) => {
            let inner: Value = serde_json::from_str(s)
                .map_err(|e| CoreError::InvalidCompletedLessons(e.to_string()))?;
            if inner.is_string() {
                return Err(CoreError::InvalidCompletedLessons("doubly encoded string".to_string()));
            }
            parse_completed_lessons(&inner)
        }
        other => Err(CoreError::InvalidCompletedLessons(format!("unexpected value: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson::ContentType;
    use serde_json::json;

    fn ids(raw: &[i64]) -> BTreeSet<LessonId> {
        raw.iter().copied().map(LessonId).collect()
    }

    #[test]
    fn new_learner_starts_at_first_page() {
        let record = ProgressRecord::new_learner();
        assert_eq!(record.pointer(), RouteTarget::new(0, 1));
        assert!(record.completed_lesson_ids.is_empty());
    }

    #[test]
    fn zero_lesson_reads_as_first_page() {
        let record = ProgressRecord::new(2, 0, []);
        assert_eq!(record.pointer(), RouteTarget::new(2, 1));
    }

    #[test]
    fn visited_covers_past_levels_and_pages_up_to_pointer() {
        let record = ProgressRecord::new(1, 2, []);
        assert!(record.is_visited(&Lesson::new(1, 0, 9, ContentType::Information)));
        assert!(record.is_visited(&Lesson::new(2, 1, 2, ContentType::Quiz)));
        assert!(!record.is_visited(&Lesson::new(3, 1, 3, ContentType::Information)));
        assert!(!record.is_visited(&Lesson::new(4, 2, 1, ContentType::Information)));
    }

    #[test]
    fn merge_unions_completions_and_keeps_furthest_pointer() {
        let local = ProgressRecord::new(0, 3, ids(&[1, 2, 3]));
        let remote = ProgressRecord::new(0, 2, ids(&[1, 2, 7]));
        let merged = local.merged_with(&remote);
        assert_eq!(merged.pointer(), RouteTarget::new(0, 3));
        assert_eq!(merged.completed_lesson_ids, ids(&[1, 2, 3, 7]));
        assert!(local.is_ahead_of(&remote));
        assert!(!merged.is_ahead_of(&merged.clone()));
    }

    #[test]
    fn route_targets_order_lexicographically() {
        assert!(RouteTarget::new(0, 9) < RouteTarget::new(1, 1));
        assert!(RouteTarget::new(1, 1) < RouteTarget::new(1, 2));
        assert_eq!(RouteTarget::new(2, 4).to_string(), "/learn/2/4");
    }

    #[test]
    fn parses_completed_lessons_in_all_wire_shapes() {
        assert_eq!(parse_completed_lessons(&json!([3, 1, 3])).unwrap(), ids(&[1, 3]));
        assert_eq!(parse_completed_lessons(&json!(["2", " 5 "])).unwrap(), ids(&[2, 5]));
        assert_eq!(parse_completed_lessons(&json!("[4, 6]")).unwrap(), ids(&[4, 6]));
        assert_eq!(parse_completed_lessons(&json!(null)).unwrap(), ids(&[]));
        assert_eq!(parse_completed_lessons(&json!("")).unwrap(), ids(&[]));
        assert!(parse_completed_lessons(&json!([1.5])).is_err());
        assert!(parse_completed_lessons(&json!({"a": 1})).is_err());
        assert!(parse_completed_lessons(&json!(["x"])).is_err());
    }
}
