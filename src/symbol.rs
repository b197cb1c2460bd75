//! Per-generator counters used to synthesize unique ASM labels.
use rustc_hash::FxHashMap;

pub type Symbol<'s> = &'s str;

/// Tracks how many times each call target has been called so far, so that
/// every `call g n` in the program gets a distinct return-address label
/// `g$ret.k`. Lives on the generator, not the parser: a single VM build may
/// span several files feeding the same generator (see REDESIGN FLAGS).
#[derive(Default)]
pub(crate) struct SymbolTable<'source> {
    call_counts: FxHashMap<Symbol<'source>, u16>,
    compare_counter: u32,
}

impl<'s> SymbolTable<'s> {
    pub fn new() -> Self {
        SymbolTable {
            call_counts: FxHashMap::default(),
            compare_counter: 0,
        }
    }

    /// Returns this call's 0-based ordinal among all calls to `target` seen so
    /// far: 0 on the first call, 1 on the second, and so on.
    pub fn call_ordinal(&mut self, target: Symbol<'s>) -> u16 {
        *self
            .call_counts
            .entry(target)
            .and_modify(|count| *count += 1)
            .or_insert(0)
    }

    /// Returns the next id from the single, whole-generator comparison-label
    /// counter, then advances it. Shared across all `eq`/`gt`/`lt` in a build,
    /// regardless of which function or file they came from.
    pub fn next_compare_id(&mut self) -> u32 {
        let id = self.compare_counter;
        self.compare_counter += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_ordinal_increments_per_target() {
        let mut t = SymbolTable::new();

        assert_eq!(t.call_ordinal("Foo.bar"), 0);
        assert_eq!(t.call_ordinal("Other.baz"), 0);
        assert_eq!(t.call_ordinal("Foo.bar"), 1);
        assert_eq!(t.call_ordinal("Foo.bar"), 2);
        assert_eq!(t.call_ordinal("Other.baz"), 1);
    }

    #[test]
    fn compare_counter_is_global_and_monotonic() {
        let mut t = SymbolTable::new();

        assert_eq!(t.next_compare_id(), 0);
        assert_eq!(t.next_compare_id(), 1);
        assert_eq!(t.call_ordinal("Anything"), 0);
        assert_eq!(t.next_compare_id(), 2);
    }
}
