/// Number of fields a crontab entry splits into: five schedule fields plus the command.
pub const FIELD_COUNT: usize = 6;

/// Split one crontab line into its schedule fields and command.
///
/// Splits on single spaces into at most [`FIELD_COUNT`] parts. The last part is the
/// unsplit remainder of the line, so a command keeps its own spaces. Runs of spaces
/// are not collapsed: each extra space yields an empty field. A line with fewer than
/// five spaces yields fewer than six parts; callers reject those before building a
/// record.
pub fn tokenize(line: &str) -> Vec<String> {
    line.splitn(FIELD_COUNT, ' ').map(str::to_string).collect()
}
