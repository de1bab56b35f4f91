use crate::error::CoreError;
use crate::progress::RouteTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The stable, curriculum-wide identifier of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonId(pub i64);

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LessonId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// The kind of widget a lesson page renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Information,
    Quiz,
    DragAndDrop,
    MiniBacktesting,
}

impl ContentType {
    /// Whether a lesson of this type must be passed before the learner moves on.
    pub fn requires_gate(&self) -> bool {
        matches!(self, ContentType::Quiz | ContentType::DragAndDrop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Information => "information",
            ContentType::Quiz => "quiz",
            ContentType::DragAndDrop => "drag_and_drop",
            ContentType::MiniBacktesting => "mini_backtesting",
        }
    }
}

impl FromStr for ContentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "information" | "info" => Ok(ContentType::Information),
            "quiz" => Ok(ContentType::Quiz),
            "drag_and_drop" => Ok(ContentType::DragAndDrop),
            "mini_backtesting" => Ok(ContentType::MiniBacktesting),
            other => Err(CoreError::UnknownContentType(other.to_string())),
        }
    }
}

/// A single page of the curriculum.
///
/// `page_number` is the 1-based position of the lesson within its level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub level: u32,
    pub page_number: u32,
    #[serde(rename = "page_title", default)]
    pub title: String,
    #[serde(default)]
    pub lesson_title: Option<String>,
    pub content_type: ContentType,
    pub requires_completion_gate: bool,
}

impl Lesson {
    /// Creates a lesson whose gate requirement follows its content type.
    pub fn new(id: impl Into<LessonId>, level: u32, page_number: u32, content_type: ContentType) -> Self {
        Self {
            id: id.into(),
            level,
            page_number,
            title: String::new(),
            lesson_title: None,
            content_type,
            requires_completion_gate: content_type.requires_gate(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_gate(mut self, requires_completion_gate: bool) -> Self {
        self.requires_completion_gate = requires_completion_gate;
        self
    }

    /// The route at which this lesson is rendered.
    pub fn position(&self) -> RouteTarget {
        RouteTarget::new(self.level, self.page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_follows_content_type() {
        assert!(Lesson::new(1, 0, 1, ContentType::Quiz).requires_completion_gate);
        assert!(Lesson::new(2, 0, 2, ContentType::DragAndDrop).requires_completion_gate);
        assert!(!Lesson::new(3, 0, 3, ContentType::Information).requires_completion_gate);
        assert!(!Lesson::new(4, 0, 4, ContentType::MiniBacktesting).with_gate(false).requires_completion_gate);
    }

    #[test]
    fn content_type_parses_wire_names() {
        assert_eq!("drag_and_drop".parse::<ContentType>(), Ok(ContentType::DragAndDrop));
        assert_eq!(" Quiz ".parse::<ContentType>(), Ok(ContentType::Quiz));
        assert!("slideshow".parse::<ContentType>().is_err());
    }

    #[test]
    fn lesson_serializes_with_page_title() {
        let lesson = Lesson::new(7, 1, 2, ContentType::Information).with_title("Long vs Short");
        let json = serde_json::to_value(&lesson).unwrap();
        assert_eq!(json["page_title"], "Long vs Short");
        assert_eq!(json["content_type"], "information");
        assert_eq!(json["id"], 7);
    }
}
