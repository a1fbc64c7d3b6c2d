//! Human-readable error rendering for the CLI.

use crate::error::Error;

/// ANSI bold escape for tty headings.
const BOLD: &str = "\x1b[1m";
/// ANSI reset escape.
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(error: &Error) {
    let md = render_error(error);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and how to fix it.
pub fn render_error(error: &Error) -> String {
    return match error {
        Error::AmbiguousOwner { claim, first, second } => format!(
            "\
# Error: Ambiguous Store Configuration

Stores `{first}` and `{second}` both claim `{claim}`.

## Fix

Narrow one store's claims or remove the duplicate registration. Resolution
precedence follows registration order, but identical claims are rejected at
startup.
"
        ),

        Error::ConfigNotFound { path } => format!(
            "\
# Error: Config Not Found

`{}` does not exist.

## Fix

Create a `.defreg.toml` with a `[namespaces]` table mapping each namespace
to its bundle directory.
",
            path.display()
        ),

        Error::DefinitionNotFound { descriptor } => format!(
            "\
# Error: Component Could Not Be Loaded

No definition found for `{descriptor}`.

## Fix

Check the qualified name, and that the namespace is configured and the
bundle file exists under it.
"
        ),

        Error::DependencyResolution { root, source } => format!(
            "\
# Error: Component Could Not Be Loaded

Resolving the dependencies of `{root}` failed:

    {source}
"
        ),

        Error::MalformedIdentifier { input, reason } => format!(
            "\
# Error: Malformed Identifier

`{input}` does not match `prefix://namespace:name`: {reason}.
"
        ),

        Error::StaleClientState { root } => format!(
            "\
# Error: Stale Client State

The declared root `{root}` is no longer resolvable on this server.

## Fix

Reload: the client must restart its session and fetch fresh definitions.
"
        ),

        other => format!(
            "\
# Error

{other}
"
        ),
    };
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions may panic")]
mod tests {
    use super::*;
    use crate::descriptor::{DefKind, Descriptor};

    #[test]
    fn not_found_names_the_descriptor() {
        let error = Error::DefinitionNotFound {
            descriptor: Descriptor::new("markup", "ui", "gone", DefKind::Component),
        };
        let rendered = render_error(&error);
        assert!(rendered.contains("Component Could Not Be Loaded"));
        assert!(rendered.contains("markup://ui:gone"));
    }

    #[test]
    fn stale_state_asks_for_a_reload() {
        let error = Error::StaleClientState {
            root: Descriptor::new("markup", "ui", "app", DefKind::Application),
        };
        assert!(render_error(&error).contains("restart its session"));
    }
}
