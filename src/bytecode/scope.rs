/// Lexical scope stack assigning local variable slots within one function.
///
/// Locals live in a flat vector; each `enter` records the current length as
/// a frame mark and `leave` truncates back to it, so slot indices freed by a
/// finished block are reused by later sibling blocks. `max_locals` is the
/// high-water mark of simultaneously live locals and becomes the function's
/// frame size, since slots are time-multiplexed across siblings.
#[derive(Debug, Default)]
pub struct Scope {
    /// All currently live locals, innermost declarations last.
    locals: Vec<String>,
    /// Live-count marks to truncate back to on `leave`.
    frames: Vec<usize>,
    max_locals: u16,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a nested block scope.
    pub fn enter(&mut self) {
        self.frames.push(self.locals.len());
    }

    /// Closes the innermost block scope, dropping its declarations.
    pub fn leave(&mut self) {
        debug_assert!(!self.frames.is_empty(), "leave without matching enter");
        if let Some(mark) = self.frames.pop() {
            self.locals.truncate(mark);
        }
    }

    /// Declares `name` in the innermost scope and returns its slot.
    ///
    /// The slot is the live count before the declaration; an outer variable
    /// of the same name is shadowed, not replaced.
    pub fn declare(&mut self, name: &str) -> u16 {
        let slot = self.locals.len() as u16;
        self.locals.push(name.to_string());
        if self.locals.len() as u16 > self.max_locals {
            self.max_locals = self.locals.len() as u16;
        }
        slot
    }

    /// Resolves `name` to its slot, innermost declaration first.
    pub fn get(&self, name: &str) -> Option<u16> {
        self.locals
            .iter()
            .rposition(|local| local == name)
            .map(|index| index as u16)
    }

    /// Peak number of simultaneously live locals over this scope's lifetime.
    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_slots() {
        let mut scope = Scope::new();
        assert_eq!(scope.declare("a"), 0);
        assert_eq!(scope.declare("b"), 1);
        assert_eq!(scope.get("a"), Some(0));
        assert_eq!(scope.get("b"), Some(1));
        assert_eq!(scope.max_locals(), 2);
    }

    #[test]
    fn test_unknown_name() {
        let scope = Scope::new();
        assert_eq!(scope.get("missing"), None);
    }

    #[test]
    fn test_sibling_scopes_reuse_slots() {
        let mut scope = Scope::new();
        scope.declare("keep");

        scope.enter();
        assert_eq!(scope.declare("first"), 1);
        scope.leave();

        scope.enter();
        assert_eq!(scope.declare("second"), 1);
        scope.leave();

        // Two siblings shared slot 1, so only two slots were ever live.
        assert_eq!(scope.max_locals(), 2);
    }

    #[test]
    fn test_nested_scopes_never_alias() {
        let mut scope = Scope::new();
        scope.enter();
        let outer = scope.declare("outer");
        scope.enter();
        let inner = scope.declare("inner");
        assert_ne!(outer, inner);
        scope.leave();
        scope.leave();
        assert_eq!(scope.max_locals(), 2);
    }

    #[test]
    fn test_shadowing_resolves_innermost_then_reverts() {
        let mut scope = Scope::new();
        let outer = scope.declare("x");

        scope.enter();
        let inner = scope.declare("x");
        assert_eq!(scope.get("x"), Some(inner));
        scope.leave();

        assert_eq!(scope.get("x"), Some(outer));
    }

    #[test]
    fn test_leave_drops_only_own_frame() {
        let mut scope = Scope::new();
        scope.declare("param");
        scope.enter();
        scope.declare("a");
        scope.declare("b");
        scope.leave();

        assert_eq!(scope.get("param"), Some(0));
        assert_eq!(scope.get("a"), None);
        assert_eq!(scope.get("b"), None);
    }

    #[test]
    fn test_max_locals_is_high_water_mark() {
        let mut scope = Scope::new();
        scope.enter();
        scope.declare("a");
        scope.declare("b");
        scope.declare("c");
        scope.leave();
        scope.enter();
        scope.declare("d");
        scope.leave();

        assert_eq!(scope.max_locals(), 3);
    }
}
