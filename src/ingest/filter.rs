/// Marker that starts a commented-out crontab line.
pub const COMMENT_MARKER: char = '#';

/// Whether a non-empty crontab line should be ingested.
///
/// Commented lines are only dropped when `include_commented` is false.
pub fn is_eligible(line: &str, include_commented: bool) -> bool {
    include_commented || !line.starts_with(COMMENT_MARKER)
}
