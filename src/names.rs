use crate::Role;

/// Process-wide source of widget names and action verbs.
///
/// Command names must be unique across a match; the source signals exhaustion
/// by returning `None`, and the grid generator stops placing widgets at that
/// point. Action verbs are not required to be unique.
pub trait NameSource: Send + Sync {
    /// Next unique command name for a slot with the given role, or `None`
    /// when the underlying word list has run dry.
    fn command_name(&mut self, role: Role) -> Option<String>;
    /// Next action verb for an `Actions` widget.
    fn action_name(&mut self) -> String;
}
