use crate::compiler_frontend::string_interning::{StringId, StringTable};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CharPosition {
    pub line_number: i32,
    pub char_column: i32,
}

/// Source span attached to every IR statement, terminator and declaration.
/// `scope` is the interned source file name, when the front end knows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TextLocation {
    pub scope: Option<StringId>,
    pub start_pos: CharPosition,
    pub end_pos: CharPosition,
}

impl TextLocation {
    pub fn new(scope: Option<StringId>, start: CharPosition, end: CharPosition) -> Self {
        Self {
            scope,
            start_pos: start,
            end_pos: end,
        }
    }

    pub fn new_just_line(line: i32) -> Self {
        Self {
            scope: None,
            start_pos: CharPosition {
                line_number: line,
                char_column: 0,
            },
            end_pos: CharPosition {
                line_number: line,
                char_column: 120, // Arbitrary number
            },
        }
    }

    pub fn with_scope(mut self, scope: StringId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn file_name<'a>(&self, string_table: &'a StringTable) -> Option<&'a str> {
        self.scope.map(|scope| string_table.resolve(scope))
    }
}

impl std::fmt::Display for TextLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}",
            self.start_pos.line_number + 1,
            self.start_pos.char_column + 1
        )
    }
}
