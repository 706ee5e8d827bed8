/// Placeholder substituted with the configured tag list.
pub const TAGS_PLACEHOLDER: &str = "$TAGS";

/// Group form of the placeholder; substitution only happens when the template contains it.
pub const TAGS_GROUP: &str = "($TAGS)";

/// Expand a pattern template into the regex passed to the scanner.
///
/// Tags are joined with `|` verbatim, so a tag may itself carry regex syntax.
/// Only the first `$TAGS` is substituted.
pub fn expand_tags(template: &str, tags: &[String]) -> String {
    if template.contains(TAGS_GROUP) {
        template.replacen(TAGS_PLACEHOLDER, &tags.join("|"), 1)
    } else {
        template.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn expands_grouped_placeholder() {
        assert_eq!(
            expand_tags("(//|#)\\s*($TAGS)", &tags(&["TODO", "FIXME"])),
            "(//|#)\\s*(TODO|FIXME)"
        );
    }

    #[test]
    fn only_the_first_placeholder_is_expanded() {
        assert_eq!(
            expand_tags("($TAGS):\\s*\\$TAGS", &tags(&["TODO", "BUG"])),
            "(TODO|BUG):\\s*\\$TAGS"
        );
    }

    #[test]
    fn bare_placeholder_is_left_alone() {
        assert_eq!(expand_tags("$TAGS:", &tags(&["TODO"])), "$TAGS:");
    }

    #[test]
    fn templates_without_placeholder_pass_through() {
        assert_eq!(expand_tags("XXX", &tags(&["TODO"])), "XXX");
    }
}
