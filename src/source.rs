//! Source locator: descriptor ↔ on-disk location conventions.
//!
//! Bundle layout is `<namespace>/<name>/<file>`. The filename-convention
//! table here is a fixed contract shared by the file store (descriptor →
//! path) and the invalidation mapper (changed path → descriptor).

use std::path::{Path, PathBuf};

use crate::descriptor::{DefKind, Descriptor};

/// Addressing prefix for style definitions.
pub const CSS_PREFIX: &str = "css";

/// Addressing prefix for script definitions.
pub const JS_PREFIX: &str = "js";

/// Addressing prefix for markup definitions.
pub const MARKUP_PREFIX: &str = "markup";

/// Map a changed source path back to the descriptor it affects.
///
/// Returns `None` for paths outside the convention table: an unrecognized
/// suffix (e.g. a compiled-code source file) cannot be cheaply related to
/// affected descriptors, which the invalidation consumer treats as a
/// whole-cache flush signal.
pub fn descriptor_for_path(path: &Path) -> Option<Descriptor> {
    let file = path.file_name()?.to_str()?;
    let bundle = path.parent()?.file_name()?.to_str()?;
    let namespace = path.parent()?.parent()?.file_name()?.to_str()?;
    let (stem, extension) = file.rsplit_once('.')?;

    let (prefix, kind) = match extension {
        "app" | "cmp" | "evt" | "flavors" | "intf" | "tokens" => {
            (MARKUP_PREFIX, markup_kind_for_extension(extension, stem, bundle)?)
        },
        "css" => (CSS_PREFIX, style_kind_for_stem(stem, bundle)?),
        "js" => (JS_PREFIX, script_kind_for_stem(stem, bundle)?),
        _ => return None,
    };

    return Some(Descriptor::new(prefix, namespace, bundle, kind));
}

/// The addressing prefix a kind is served under.
pub fn expected_prefix(kind: DefKind) -> &'static str {
    return match kind {
        DefKind::Application
        | DefKind::Component
        | DefKind::Event
        | DefKind::Flavors
        | DefKind::Interface
        | DefKind::Tokens => MARKUP_PREFIX,
        DefKind::Controller
        | DefKind::Helper
        | DefKind::Model
        | DefKind::Provider
        | DefKind::Renderer
        | DefKind::TestSuite => JS_PREFIX,
        DefKind::FlavoredStyle | DefKind::Style => CSS_PREFIX,
    };
}

/// The conventional file name for a descriptor inside its bundle directory.
pub fn file_name_for(descriptor: &Descriptor) -> String {
    let name = &descriptor.name;
    return match descriptor.kind {
        DefKind::Application => format!("{name}.app"),
        DefKind::Component => format!("{name}.cmp"),
        DefKind::Controller => format!("{name}Controller.js"),
        DefKind::Event => format!("{name}.evt"),
        DefKind::FlavoredStyle => format!("{name}Flavors.css"),
        DefKind::Flavors => format!("{name}.flavors"),
        DefKind::Helper => format!("{name}Helper.js"),
        DefKind::Interface => format!("{name}.intf"),
        DefKind::Model => format!("{name}Model.js"),
        DefKind::Provider => format!("{name}Provider.js"),
        DefKind::Renderer => format!("{name}Renderer.js"),
        DefKind::Style => format!("{name}.css"),
        DefKind::TestSuite => format!("{name}Test.js"),
        DefKind::Tokens => format!("{name}.tokens"),
    };
}

/// Markup kinds keyed by bundle-file extension. The stem must name the
/// bundle; anything else is outside the convention.
fn markup_kind_for_extension(extension: &str, stem: &str, bundle: &str) -> Option<DefKind> {
    if stem != bundle {
        return None;
    }
    return match extension {
        "app" => Some(DefKind::Application),
        "cmp" => Some(DefKind::Component),
        "evt" => Some(DefKind::Event),
        "flavors" => Some(DefKind::Flavors),
        "intf" => Some(DefKind::Interface),
        "tokens" => Some(DefKind::Tokens),
        _ => None,
    };
}

/// The bundle-relative path for a descriptor: `<namespace>/<name>/<file>`.
pub fn relative_path_for(descriptor: &Descriptor) -> PathBuf {
    return PathBuf::from(&descriptor.namespace)
        .join(&descriptor.name)
        .join(file_name_for(descriptor));
}

/// Script kinds keyed by the stem's naming-suffix convention,
/// `<bundle><Suffix>.js`.
fn script_kind_for_stem(stem: &str, bundle: &str) -> Option<DefKind> {
    let suffix = stem.strip_prefix(bundle)?;
    return match suffix {
        "Controller" => Some(DefKind::Controller),
        "Helper" => Some(DefKind::Helper),
        "Model" => Some(DefKind::Model),
        "Provider" => Some(DefKind::Provider),
        "Renderer" => Some(DefKind::Renderer),
        "Test" => Some(DefKind::TestSuite),
        _ => None,
    };
}

/// Style kinds: `<bundle>.css` is the plain style, `<bundle>Flavors.css`
/// the flavored variant.
fn style_kind_for_stem(stem: &str, bundle: &str) -> Option<DefKind> {
    if stem == bundle {
        return Some(DefKind::Style);
    }
    if stem.strip_prefix(bundle) == Some("Flavors") {
        return Some(DefKind::FlavoredStyle);
    }
    return None;
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions may panic")]
mod tests {
    use super::*;

    #[test]
    fn bundle_markup_file_maps_to_component() {
        let descriptor = descriptor_for_path(Path::new("/ns/foo/foo.cmp")).unwrap();
        assert_eq!(descriptor, Descriptor::new("markup", "ns", "foo", DefKind::Component));
    }

    #[test]
    fn controller_script_maps_by_naming_suffix() {
        let descriptor = descriptor_for_path(Path::new("/ns/foo/fooController.js")).unwrap();
        assert_eq!(descriptor, Descriptor::new("js", "ns", "foo", DefKind::Controller));
    }

    #[test]
    fn flavored_style_maps_by_naming_convention() {
        let descriptor = descriptor_for_path(Path::new("/ns/foo/fooFlavors.css")).unwrap();
        assert_eq!(descriptor, Descriptor::new("css", "ns", "foo", DefKind::FlavoredStyle));
    }

    #[test]
    fn mismatched_stem_is_outside_the_convention() {
        assert_eq!(descriptor_for_path(Path::new("/ns/foo/bar.cmp")), None);
    }

    #[test]
    fn plain_style_maps_to_style() {
        let descriptor = descriptor_for_path(Path::new("/ns/foo/foo.css")).unwrap();
        assert_eq!(descriptor, Descriptor::new("css", "ns", "foo", DefKind::Style));
    }

    #[test]
    fn round_trip_through_relative_path() {
        let descriptor = Descriptor::new("js", "ui", "panel", DefKind::Renderer);
        let path = PathBuf::from("/roots").join(relative_path_for(&descriptor));
        assert_eq!(descriptor_for_path(&path), Some(descriptor));
    }

    #[test]
    fn unrecognized_suffix_maps_to_no_descriptor() {
        assert_eq!(descriptor_for_path(Path::new("/ns/foo/fooModel.java")), None);
    }
}
