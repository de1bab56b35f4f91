use core_types::{ContentType, Curriculum, Lesson};

/// Level 0: lessons 1..=3 (3 is gated). Level 1: lessons 4, 5 (5 is gated). Level 2: lesson 6 (gated).
pub fn curriculum() -> Curriculum {
    Curriculum::from_lessons([
        Lesson::new(1, 0, 1, ContentType::Information).with_title("Welcome"),
        Lesson::new(2, 0, 2, ContentType::Information).with_title("Candles"),
        Lesson::new(3, 0, 3, ContentType::Quiz).with_title("Candle quiz"),
        Lesson::new(4, 1, 1, ContentType::Information).with_title("Moving averages"),
        Lesson::new(5, 1, 2, ContentType::DragAndDrop).with_title("Match the signals"),
        Lesson::new(6, 2, 1, ContentType::Quiz).with_title("Final quiz"),
    ])
    .expect("fixture curriculum is valid")
}
