use crate::error::CoreError;
use crate::lesson::{Lesson, LessonId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// The ordered lessons of one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumLevel {
    pub level: u32,
    pub lessons: Vec<Lesson>,
}

impl CurriculumLevel {
    pub fn first(&self) -> Option<&Lesson> {
        self.lessons.first()
    }

    pub fn last(&self) -> Option<&Lesson> {
        self.lessons.last()
    }
}

/// The full, validated curriculum.
///
/// Construction guarantees that the curriculum is non-empty, that levels are
/// strictly increasing and non-empty, that page numbers within a level are
/// contiguous from 1, and that lesson ids are unique across all levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Curriculum {
    levels: Vec<CurriculumLevel>,
}

impl Curriculum {
    /// Validates a list of levels. Lessons inside each level are sorted by page number first.
    pub fn new(mut levels: Vec<CurriculumLevel>) -> Result<Self, CoreError> {
        if levels.is_empty() {
            return Err(CoreError::InvalidCurriculum("curriculum has no levels".to_string()));
        }

        let mut seen_ids = HashSet::new();
        let mut previous_level: Option<u32> = None;

        for level in &mut levels {
            if let Some(prev) = previous_level {
                if level.level <= prev {
                    return Err(CoreError::InvalidCurriculum(format!(
                        "level {} follows level {}",
                        level.level, prev
                    )));
                }
            }
            previous_level = Some(level.level);

            if level.lessons.is_empty() {
                return Err(CoreError::InvalidCurriculum(format!("level {} has no lessons", level.level)));
            }

            level.lessons.sort_by_key(|l| l.page_number);
            for (index, lesson) in level.lessons.iter().enumerate() {
                if lesson.level != level.level {
                    return Err(CoreError::InvalidCurriculum(format!(
                        "lesson {} claims level {} but is listed under level {}",
                        lesson.id, lesson.level, level.level
                    )));
                }
                let expected = index as u32 + 1;
                if lesson.page_number != expected {
                    return Err(CoreError::InvalidCurriculum(format!(
                        "level {} expected page {} but found page {}",
                        level.level, expected, lesson.page_number
                    )));
                }
                if !seen_ids.insert(lesson.id) {
                    return Err(CoreError::InvalidCurriculum(format!("duplicate lesson id {}", lesson.id)));
                }
            }
        }

        Ok(Self { levels })
    }

    /// Groups a flat list of lessons by level and validates the result.
    pub fn from_lessons(lessons: impl IntoIterator<Item = Lesson>) -> Result<Self, CoreError> {
        let mut by_level: BTreeMap<u32, Vec<Lesson>> = BTreeMap::new();
        for lesson in lessons {
            by_level.entry(lesson.level).or_default().push(lesson);
        }
        Self::new(
            by_level
                .into_iter()
                .map(|(level, lessons)| CurriculumLevel { level, lessons })
                .collect(),
        )
    }

    pub fn levels(&self) -> &[CurriculumLevel] {
        &self.levels
    }

    pub fn level(&self, level: u32) -> Option<&CurriculumLevel> {
        self.levels.iter().find(|l| l.level == level)
    }

    /// The ordered lessons of `level`, or an empty slice when the level does not exist.
    pub fn lessons_in(&self, level: u32) -> &[Lesson] {
        self.level(level).map(|l| l.lessons.as_slice()).unwrap_or(&[])
    }

    /// The first lesson of the first level.
    pub fn first_lesson(&self) -> &Lesson {
        // Non-empty levels are guaranteed by `new`.
        &self.levels[0].lessons[0]
    }

    /// Every lesson in curriculum order.
    pub fn iter(&self) -> impl Iterator<Item = &Lesson> {
        self.levels.iter().flat_map(|l| l.lessons.iter())
    }

    pub fn lesson(&self, id: LessonId) -> Option<&Lesson> {
        self.iter().find(|l| l.id == id)
    }

    pub fn lesson_at(&self, level: u32, page_number: u32) -> Option<&Lesson> {
        self.lessons_in(level).iter().find(|l| l.page_number == page_number)
    }

    /// The lesson after `id` in curriculum order, crossing level boundaries.
    pub fn successor(&self, id: LessonId) -> Option<&Lesson> {
        let mut lessons = self.iter().skip_while(|l| l.id != id);
        lessons.next()?;
        lessons.next()
    }

    /// The lesson before `id` in curriculum order, crossing level boundaries.
    pub fn predecessor(&self, id: LessonId) -> Option<&Lesson> {
        let mut previous = None;
        for lesson in self.iter() {
            if lesson.id == id {
                return previous;
            }
            previous = Some(lesson);
        }
        None
    }

    pub fn is_last_in_level(&self, lesson: &Lesson) -> bool {
        self.level(lesson.level)
            .and_then(|l| l.last())
            .is_some_and(|last| last.id == lesson.id)
    }

    /// The first level strictly after `level`.
    pub fn next_level_after(&self, level: u32) -> Option<&CurriculumLevel> {
        self.levels.iter().find(|l| l.level > level)
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(|l| l.lessons.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
