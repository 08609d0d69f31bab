use std::sync::OnceLock;

use regex::Regex;

/// Suffix that marks a path as a single event resource.
const EVENT_SUFFIX: &str = "ics";

fn event_file_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"/[A-Za-z0-9\-%@\.]*\.ics").expect("event filename pattern is valid")
    })
}

/// Classify a resource path as a collection or a single event.
///
/// Anything without a recognizable event suffix classifies as a collection:
/// a trailing separator, a path too short to carry the suffix, or a path
/// whose last three characters are not `ics`.
pub fn is_collection(rpath: &str) -> bool {
    if rpath.ends_with('/') {
        return true;
    }
    if rpath.len() < EVENT_SUFFIX.len() {
        return true;
    }
    !rpath.ends_with(EVENT_SUFFIX)
}

/// Derive the owning collection path by stripping trailing event filename
/// components.
pub fn collection_of(rpath: &str) -> String {
    event_file_regex().replace_all(rpath, "/").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trailing_separator_is_collection() {
        assert!(is_collection("/cal/"));
        assert!(is_collection("/"));
    }

    #[test]
    fn event_suffix_is_not_collection() {
        assert!(!is_collection("/cal/event1.ics"));
        assert!(!is_collection("/a.ics"));
    }

    #[test]
    fn missing_suffix_defaults_to_collection() {
        assert!(is_collection("/cal/notes.txt"));
        assert!(is_collection("/cal/event1.ical"));
        assert!(is_collection("/cal"));
    }

    #[test]
    fn short_path_is_collection() {
        assert!(is_collection("a"));
        assert!(is_collection(""));
    }

    #[test]
    fn collection_of_strips_event_filename() {
        assert_eq!(collection_of("/cal/event1.ics"), "/cal/");
        assert_eq!(collection_of("/shared/team-a/meet%202.ics"), "/shared/team-a/");
    }

    #[test]
    fn collection_of_keeps_collection_paths() {
        assert_eq!(collection_of("/cal/"), "/cal/");
        assert_eq!(collection_of("/"), "/");
    }

    proptest! {
        #[test]
        fn ics_suffix_without_separator_is_event(stem in "[a-z0-9]{1,12}") {
            let rpath = format!("/cal/{}.ics", stem);
            prop_assert!(!is_collection(&rpath));
        }

        #[test]
        fn paths_without_ics_suffix_are_collections(rpath in "/[a-z0-9/]{0,24}") {
            prop_assume!(!rpath.ends_with("ics"));
            prop_assert!(is_collection(&rpath));
        }
    }
}
