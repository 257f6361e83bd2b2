use crate::compiler_frontend::compiler_errors::{
    CompilerError, CompilerMessages, CompilerWarning, ErrorMetaDataKey, ErrorType, WarningKind,
};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::StringTable;
use saying::say;

fn display_file(location: &TextLocation, string_table: &StringTable) -> String {
    location
        .file_name(string_table)
        .map(str::to_owned)
        .unwrap_or_default()
}

pub fn print_compiler_messages(messages: &CompilerMessages, string_table: &StringTable) {
    // Format and print out the messages:
    for err in &messages.errors {
        print_formatted_error(err, string_table);
    }

    for warning in &messages.warnings {
        print_formatted_warning(warning, string_table);
    }
}

pub fn print_formatted_error(e: &CompilerError, string_table: &StringTable) {
    let file = display_file(&e.location, string_table);
    let line_number = e.location.start_pos.line_number as usize;

    match e.error_type {
        ErrorType::Ownership => {
            if !file.is_empty() {
                say!("\n(╯°Д°)╯  🔥🔥 ", Dark Magenta file, " 🔥🔥  ╰(°□°╰) ");
            }

            say!(Red "Ownership");
        }

        ErrorType::Type => {
            if !file.is_empty() {
                say!("\n(ಠ_ಠ) ", Dark Magenta file);
                say!(Inline " ( ._. ) ");
            }

            say!(Red "Type Error");
        }

        ErrorType::Rule => {
            if !file.is_empty() {
                say!("\nヽ(˶°o°)ﾉ  🔥🔥🔥 ", Dark Magenta file, " 🔥🔥🔥  ╰(°□°╰) ");
            }

            say!(Red "Rule");
        }

        ErrorType::Compiler => {
            if !file.is_empty() {
                say!("\nヽ༼☉ ‿ ⚆༽ﾉ  🔥🔥🔥🔥 ", Dark Magenta file, " 🔥🔥🔥🔥  ╰(° _ o╰) ");
            }
            say!(Yellow "CHECKER BUG - ");
            say!(Dark Yellow "malformed IR or an internal checker issue (not your fault)");
        }

        ErrorType::Config => {
            say!(Yellow "CONFIG FILE ISSUE- ");
            say!(Dark Yellow "Malformed checker config, something doesn't make sense inside it");
            say!(Red { e.msg.as_str() });
            return;
        }
    }

    if let Some(kind) = e.kind {
        say!(Dark Yellow "[", { kind.as_str() }, "]");
    }
    say!(Dark Magenta "Line ", Bright {line_number + 1});
    say!(Red { e.msg.as_str() });

    for related in &e.related {
        say!(
            Dark Magenta "  Line ",
            Bright {related.location.start_pos.line_number + 1},
            ": ",
            { related.note.as_str() }
        );
    }

    if let Some(field_path) = e.metadata_value(ErrorMetaDataKey::FieldPath) {
        say!(Dark "  field: ", field_path);
    }

    if let Some(suggestion) = e.metadata_value(ErrorMetaDataKey::PrimarySuggestion) {
        say!(Green "  help: ", suggestion);
    }
}

pub fn print_formatted_warning(w: &CompilerWarning, string_table: &StringTable) {
    let file = display_file(&w.location, string_table);

    match w.warning_kind {
        WarningKind::UnusedValue => {
            say!(Yellow "Warning ", Dark Magenta file, " Line ", Bright {w.location.start_pos.line_number + 1});
            say!({ w.msg.as_str() });
        }
    }
}
