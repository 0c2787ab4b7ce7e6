//! Tests for [`BranchFilter`].

use super::*;

mod compile_tests {
    use super::*;

    #[test]
    fn test_valid_patterns_compile() {
        let filter = BranchFilter::compile(["^refs/heads/main$", "^refs/heads/release/.*"])
            .expect("patterns should compile");
        assert_eq!(filter.len(), 2);
        assert!(!filter.is_empty());
    }

    /// The first invalid pattern is reported back verbatim.
    #[test]
    fn test_invalid_pattern_is_reported() {
        let result = BranchFilter::compile(["^refs/heads/main$", "refs/heads/(unclosed"]);

        let (pattern, _err) = result.expect_err("unbalanced group must not compile");
        assert_eq!(pattern, "refs/heads/(unclosed");
    }

    #[test]
    fn test_pattern_order_is_preserved() {
        let filter = BranchFilter::compile(["b", "a", "c"]).unwrap();
        let patterns: Vec<&str> = filter.patterns().collect();
        assert_eq!(patterns, vec!["b", "a", "c"]);
    }
}

mod matches_tests {
    use super::*;

    #[test]
    fn test_exact_pattern_matches_only_that_branch() {
        let filter = BranchFilter::compile(["^refs/heads/main$"]).unwrap();

        assert!(filter.matches("refs/heads/main"));
        assert!(!filter.matches("refs/heads/main-old"));
        assert!(!filter.matches("refs/heads/feature/main"));
    }

    /// Patterns are not anchored by the relay, so a bare word matches anywhere.
    #[test]
    fn test_unanchored_pattern_matches_substring() {
        let filter = BranchFilter::compile(["main"]).unwrap();

        assert!(filter.matches("refs/heads/main"));
        assert!(filter.matches("refs/heads/not-main"));
        assert!(!filter.matches("refs/heads/develop"));
    }

    #[test]
    fn test_any_pattern_is_enough() {
        let filter =
            BranchFilter::compile(["^refs/heads/main$", "^refs/heads/release/"]).unwrap();

        assert!(filter.matches("refs/heads/release/1.2"));
        assert!(filter.matches("refs/heads/main"));
        assert!(!filter.matches("refs/tags/v1.2"));
    }

    /// Reordering patterns never changes the outcome.
    #[test]
    fn test_order_does_not_change_outcome() {
        let forward = BranchFilter::compile(["^refs/heads/a$", "^refs/heads/b$"]).unwrap();
        let reverse = BranchFilter::compile(["^refs/heads/b$", "^refs/heads/a$"]).unwrap();

        for git_ref in ["refs/heads/a", "refs/heads/b", "refs/heads/c"] {
            assert_eq!(forward.matches(git_ref), reverse.matches(git_ref));
        }
    }

    #[test]
    fn test_empty_filter_admits_nothing() {
        let filter = BranchFilter::compile(Vec::<String>::new()).unwrap();

        assert!(filter.is_empty());
        assert!(!filter.matches("refs/heads/main"));
        assert!(!filter.matches(""));
    }

    #[test]
    fn test_tag_refs_can_be_allowlisted() {
        let filter = BranchFilter::compile([r"^refs/tags/v\d+\.\d+\.\d+$"]).unwrap();

        assert!(filter.matches("refs/tags/v1.20.3"));
        assert!(!filter.matches("refs/tags/v1.20"));
    }

    #[test]
    fn test_negative_lookahead_excludes_a_prefix() {
        let filter = BranchFilter::compile(["^refs/heads/(?!wip/)"]).unwrap();

        assert!(filter.matches("refs/heads/main"));
        assert!(filter.matches("refs/heads/feature/wip"));
        assert!(!filter.matches("refs/heads/wip/x"));
        assert!(!filter.matches("refs/tags/v1.0.0"));
    }

    #[test]
    fn test_backreference_is_supported() {
        let filter = BranchFilter::compile([r"^refs/heads/(\w+)/\1$"]).unwrap();

        assert!(filter.matches("refs/heads/team/team"));
        assert!(!filter.matches("refs/heads/team/other"));
    }
}
