//! Suppression scopes
//!
//! The directives that hide content from one output or the other (PLI
//! BEGIN IGN/SUB, PART BEGIN IGN, SYNTH BEGIN) open windows that must
//! close in a well-formed document. Tracking them as an explicit stack,
//! rather than loose booleans, lets mismatched opens and closes be
//! reported against the exact position that broke the nesting.

use brickpub_core::data::Where;
use brickpub_core::error::ParseError;

/// The kind of suppression a scope applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Parts are kept out of the parts list.
    PliIgnore,
    /// Parts are kept out of the parts list in favour of a substitute.
    PliSubstitute,
    /// Parts are kept out of the assembly image.
    PartIgnore,
    /// Synthesized-part constituents; drawn but not listed.
    Synth,
}

impl ScopeKind {
    /// The directive text used in diagnostics
    pub fn construct(&self) -> &'static str {
        match self {
            ScopeKind::PliIgnore => "PLI BEGIN IGN",
            ScopeKind::PliSubstitute => "PLI BEGIN SUB",
            ScopeKind::PartIgnore => "PART BEGIN IGN",
            ScopeKind::Synth => "SYNTH BEGIN",
        }
    }

    /// Whether two kinds close under the same END directive
    fn same_family(self, other: ScopeKind) -> bool {
        let pli = |k| matches!(k, ScopeKind::PliIgnore | ScopeKind::PliSubstitute);
        self == other || (pli(self) && pli(other))
    }
}

/// One open suppression window
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Where the scope opened, reported when it never closes.
    pub opened_at: Where,
}

/// Stack of open suppression windows
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope
    ///
    /// # Errors
    /// Fails when a scope of the same family is already open; these
    /// windows do not nest.
    pub fn open(&mut self, kind: ScopeKind, loc: &Where) -> Result<(), ParseError> {
        if let Some(existing) = self.scopes.iter().find(|s| s.kind.same_family(kind)) {
            return Err(ParseError::NestedBegin {
                loc: loc.clone(),
                construct: format!(
                    "{} (already open at {})",
                    kind.construct(),
                    existing.opened_at
                ),
            });
        }
        self.scopes.push(Scope {
            kind,
            opened_at: loc.clone(),
        });
        Ok(())
    }

    /// Close the open scope of a family
    ///
    /// `kind` names the family being closed; a PLI END closes either PLI
    /// window.
    ///
    /// # Errors
    /// Fails when no scope of that family is open.
    pub fn close(&mut self, kind: ScopeKind, loc: &Where) -> Result<Scope, ParseError> {
        let position = self
            .scopes
            .iter()
            .rposition(|s| s.kind.same_family(kind))
            .ok_or_else(|| ParseError::UnmatchedEnd {
                loc: loc.clone(),
                construct: kind.construct().to_string(),
            })?;
        Ok(self.scopes.remove(position))
    }

    pub fn is_active(&self, kind: ScopeKind) -> bool {
        self.scopes.iter().any(|s| s.kind == kind)
    }

    /// Whether parts seen now stay out of the parts list
    pub fn parts_list_suppressed(&self) -> bool {
        self.scopes.iter().any(|s| {
            matches!(
                s.kind,
                ScopeKind::PliIgnore | ScopeKind::PliSubstitute | ScopeKind::Synth
            )
        })
    }

    /// Whether parts seen now stay out of the assembly image
    pub fn assembly_suppressed(&self) -> bool {
        self.is_active(ScopeKind::PartIgnore)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Scopes still open, oldest first; non-empty at end of a submodel
    /// means unclosed directives worth reporting
    pub fn open_scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(line: usize) -> Where {
        Where::new("m.ldr", 0, line)
    }

    #[test]
    fn test_open_close_round_trip() {
        let mut stack = ScopeStack::new();
        stack.open(ScopeKind::PliIgnore, &at(1)).expect("open");
        assert!(stack.parts_list_suppressed());
        assert!(!stack.assembly_suppressed());

        let closed = stack.close(ScopeKind::PliIgnore, &at(5)).expect("close");
        assert_eq!(closed.opened_at, at(1));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pli_windows_do_not_nest() {
        let mut stack = ScopeStack::new();
        stack.open(ScopeKind::PliIgnore, &at(1)).expect("open");
        let err = stack.open(ScopeKind::PliSubstitute, &at(2)).unwrap_err();
        assert!(matches!(err, ParseError::NestedBegin { .. }));
    }

    #[test]
    fn test_unmatched_end_is_reported() {
        let mut stack = ScopeStack::new();
        let err = stack.close(ScopeKind::PartIgnore, &at(3)).unwrap_err();
        assert!(matches!(err, ParseError::UnmatchedEnd { .. }));
    }

    #[test]
    fn test_pli_end_closes_substitute_window() {
        let mut stack = ScopeStack::new();
        stack.open(ScopeKind::PliSubstitute, &at(1)).expect("open");
        // The closing directive is plain PLI END
        stack.close(ScopeKind::PliIgnore, &at(4)).expect("close");
        assert!(stack.is_empty());
    }

    #[test]
    fn test_independent_families_overlap() {
        let mut stack = ScopeStack::new();
        stack.open(ScopeKind::PartIgnore, &at(1)).expect("open part");
        stack.open(ScopeKind::Synth, &at(2)).expect("open synth");
        assert!(stack.assembly_suppressed());
        assert!(stack.parts_list_suppressed());

        stack.close(ScopeKind::PartIgnore, &at(3)).expect("close part");
        assert!(!stack.assembly_suppressed());
        assert!(stack.parts_list_suppressed());
        assert_eq!(stack.open_scopes().len(), 1);
    }
}
