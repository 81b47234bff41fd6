use crate::model::BreakdownMap;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("active breakdown index {0} is not present in the breakdown map")]
    UnknownActiveIndex(u32),
}

/// Maps a playback line to the active breakdown key.
///
/// Returns the greatest key `k <= current_line`, or `active_index` unchanged
/// when no key qualifies (only possible for negative lines). Works for any
/// call order, so backward seeks move the index down again.
pub fn resolve(
    current_line: i64,
    map: &BreakdownMap,
    active_index: u32,
) -> Result<u32, ResolveError> {
    if !map.contains(active_index) {
        return Err(ResolveError::UnknownActiveIndex(active_index));
    }
    Ok(map.floor_key(current_line).unwrap_or(active_index))
}

/// Holds the single piece of resolver state: the active index.
#[derive(Debug, Clone, Default)]
pub struct BreakdownResolver {
    active: u32,
}

impl BreakdownResolver {
    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn reset(&mut self) {
        self.active = 0;
    }

    /// Returns `Some(index)` exactly when the active index changed; that is the
    /// colour-change notification.
    pub fn on_line_change(
        &mut self,
        line: i64,
        map: &BreakdownMap,
    ) -> Result<Option<u32>, ResolveError> {
        let next = resolve(line, map, self.active).inspect_err(|err| {
            error!(line, active = self.active, "{err}");
        })?;
        if next == self.active {
            return Ok(None);
        }
        debug!(line, from = self.active, to = next, "breakdown segment changed");
        self.active = next;
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakdown::parse_breakdown;
    use proptest::collection::btree_set;
    use proptest::prelude::*;

    fn map_with(keys: &[u32]) -> BreakdownMap {
        let body = keys
            .iter()
            .map(|key| format!(r##""{key}": {{"color": "#{key:06x}"}}"##))
            .collect::<Vec<_>>()
            .join(",");
        parse_breakdown(&format!("{{{body}}}")).expect("map")
    }

    #[test]
    fn forward_playback_walks_keys() {
        let map = map_with(&[0, 1, 3, 8]);
        let mut resolver = BreakdownResolver::default();
        let changes: Vec<_> = (0..10)
            .filter_map(|line| resolver.on_line_change(line, &map).expect("resolve"))
            .collect();
        assert_eq!(changes, vec![1, 3, 8]);
        assert_eq!(resolver.active(), 8);
    }

    #[test]
    fn backward_seek_moves_index_down() {
        let map = map_with(&[0, 4, 9]);
        let mut resolver = BreakdownResolver::default();
        assert_eq!(resolver.on_line_change(12, &map).expect("resolve"), Some(9));
        assert_eq!(resolver.on_line_change(5, &map).expect("resolve"), Some(4));
        assert_eq!(resolver.on_line_change(2, &map).expect("resolve"), Some(0));
    }

    #[test]
    fn repeated_line_notifies_once() {
        let map = map_with(&[0, 2]);
        let mut resolver = BreakdownResolver::default();
        assert_eq!(resolver.on_line_change(2, &map).expect("resolve"), Some(2));
        assert_eq!(resolver.on_line_change(2, &map).expect("resolve"), None);
        assert_eq!(resolver.on_line_change(3, &map).expect("resolve"), None);
    }

    #[test]
    fn negative_line_leaves_index_unchanged() {
        let map = map_with(&[0, 2]);
        assert_eq!(resolve(-1, &map, 2), Ok(2));
    }

    #[test]
    fn unknown_active_index_is_reported() {
        let map = map_with(&[0, 2]);
        assert_eq!(resolve(5, &map, 1), Err(ResolveError::UnknownActiveIndex(1)));

        let mut resolver = BreakdownResolver { active: 7 };
        assert!(resolver.on_line_change(3, &map).is_err());
        assert_eq!(resolver.active(), 7);
    }

    proptest! {
        #[test]
        fn resolve_returns_greatest_key_not_above_line(
            extra in btree_set(1_u32..500, 0..20),
            line in 0_i64..600,
            pick in any::<prop::sample::Index>(),
        ) {
            let mut keys: Vec<u32> = extra.into_iter().collect();
            keys.insert(0, 0);
            let map = map_with(&keys);
            let active = keys[pick.index(keys.len())];

            let resolved = resolve(line, &map, active).expect("active is a key");
            let expected = keys.iter().copied().filter(|key| i64::from(*key) <= line).max();
            prop_assert_eq!(Some(resolved), expected);

            let again = resolve(line, &map, resolved).expect("resolved is a key");
            prop_assert_eq!(again, resolved);
        }
    }
}
