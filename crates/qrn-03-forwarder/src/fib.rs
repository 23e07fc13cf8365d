//! Forwarding Information Base.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use shared_types::{MultiplexingVector, NodeName, PathId, PathInstructions, ReqId};
use sim_kernel::Time;

/// Forwarding information for one path at one node.
#[derive(Debug, Clone, PartialEq)]
pub struct FibEntry {
    /// Path identifier, identifies the end-to-end path.
    pub path_id: PathId,
    /// Request identifier, identifies the source-destination pair.
    pub req_id: ReqId,
    /// Nodes traversed by the path, in order.
    pub route: Vec<NodeName>,
    /// Index of own node within the route.
    pub own_idx: usize,
    /// Swap rank per route node; smaller ranks swap first.
    pub swap: Vec<u32>,
    /// Cutoff budget per route node; `None` means unbounded.
    pub swap_cutoff: Vec<Option<Time>>,
    /// Per-link qubit allocation, buffer-space multiplexing only.
    pub m_v: Option<MultiplexingVector>,
    /// Segment name to required purification rounds.
    pub purif: BTreeMap<String, u32>,
}

impl FibEntry {
    /// Build the entry installed at `own` from controller instructions.
    /// Returns `None` when `own` is not on the route.
    pub fn from_instructions(
        path_id: PathId,
        ins: &PathInstructions,
        own: &str,
        accuracy: u64,
    ) -> Option<Self> {
        let own_idx = ins.route.iter().position(|n| n == own)?;
        let swap_cutoff = (0..ins.route.len())
            .map(|idx| ins.cutoff_budget(idx, accuracy))
            .collect();
        Some(FibEntry {
            path_id,
            req_id: ins.req_id,
            route: ins.route.clone(),
            own_idx,
            swap: ins.swap.clone(),
            swap_cutoff,
            m_v: ins.m_v.clone(),
            purif: ins.purif.clone(),
        })
    }

    pub fn own_swap_rank(&self) -> u32 {
        self.swap[self.own_idx]
    }

    /// Node index in the route and its swap rank.
    pub fn find_index_and_rank(&self, node: &str) -> Option<(usize, u32)> {
        let idx = self.route.iter().position(|n| n == node)?;
        Some((idx, self.swap[idx]))
    }

    /// Swapping is disabled when the swap sequence is all zeros (checked at
    /// the ends, which always carry the maximum rank otherwise).
    pub fn is_swap_disabled(&self) -> bool {
        self.swap[0] == 0 && *self.swap.last().unwrap() == 0
    }

    /// Whether own node is one of the path's end nodes.
    pub fn is_endpoint(&self) -> bool {
        self.own_idx == 0 || self.own_idx == self.route.len() - 1
    }

    /// Own node's cutoff budget.
    pub fn own_cutoff_budget(&self) -> Option<Time> {
        self.swap_cutoff[self.own_idx]
    }

    /// Neighbor on the route at the given offset from own node.
    pub fn neighbor(&self, offset: isize) -> Option<&NodeName> {
        let idx = self.own_idx as isize + offset;
        if idx < 0 {
            return None;
        }
        self.route.get(idx as usize)
    }

    /// Purification segment name between own node and `partner`, in route
    /// order.
    pub fn segment_name(&self, partner: &str) -> Option<String> {
        let own = &self.route[self.own_idx];
        let (p_idx, _) = self.find_index_and_rank(partner)?;
        Some(if self.own_idx < p_idx {
            format!("{own}-{partner}")
        } else {
            format!("{partner}-{own}")
        })
    }
}

/// FIB information grouped by request id.
#[derive(Debug, Clone)]
pub struct FibRequestGroup {
    pub req_id: ReqId,
    pub src: NodeName,
    pub dst: NodeName,
    pub path_ids: BTreeSet<PathId>,
}

impl FibRequestGroup {
    fn new(entry: &FibEntry) -> Self {
        FibRequestGroup {
            req_id: entry.req_id,
            src: entry.route.first().unwrap().clone(),
            dst: entry.route.last().unwrap().clone(),
            path_ids: BTreeSet::from([entry.path_id]),
        }
    }
}

/// The per-node forwarding table.
#[derive(Debug, Default)]
pub struct Fib {
    table: HashMap<PathId, FibEntry>,
    by_req_id: HashMap<ReqId, FibRequestGroup>,
}

impl Fib {
    pub fn new() -> Self {
        Fib::default()
    }

    pub fn get(&self, path_id: PathId) -> Option<&FibEntry> {
        self.table.get(&path_id)
    }

    /// Insert an entry, replacing any entry with the same path id wholesale.
    pub fn insert_or_replace(&mut self, entry: FibEntry) {
        self.erase(entry.path_id);

        match self.by_req_id.get_mut(&entry.req_id) {
            Some(group) => {
                assert_eq!(group.src, *entry.route.first().unwrap());
                assert_eq!(group.dst, *entry.route.last().unwrap());
                group.path_ids.insert(entry.path_id);
            }
            None => {
                self.by_req_id.insert(entry.req_id, FibRequestGroup::new(&entry));
            }
        }
        self.table.insert(entry.path_id, entry);
    }

    /// Remove an entry; a nonexistent path id is silently ignored.
    pub fn erase(&mut self, path_id: PathId) {
        let Some(entry) = self.table.remove(&path_id) else {
            return;
        };
        if let Some(group) = self.by_req_id.get_mut(&entry.req_id) {
            group.path_ids.remove(&path_id);
            if group.path_ids.is_empty() {
                self.by_req_id.remove(&entry.req_id);
            }
        }
    }

    pub fn path_ids_by_request(&self, req_id: ReqId) -> BTreeSet<PathId> {
        self.by_req_id
            .get(&req_id)
            .map(|g| g.path_ids.clone())
            .unwrap_or_default()
    }

    /// Whether any installed request connects `src` to `dst`.
    pub fn has_request(&self, src: &str, dst: &str) -> bool {
        self.by_req_id
            .values()
            .any(|g| g.src == src && g.dst == dst)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::make_path_instructions;

    const ACC: u64 = 1_000_000;

    fn instructions(req_id: ReqId) -> PathInstructions {
        make_path_instructions(
            req_id,
            vec!["n1".into(), "n2".into(), "n3".into()],
            vec![1, 0, 1],
            None,
            None,
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_entry_rank_and_endpoint_helpers() {
        let entry = FibEntry::from_instructions(0, &instructions(0), "n2", ACC).unwrap();
        assert_eq!(entry.own_idx, 1);
        assert_eq!(entry.own_swap_rank(), 0);
        assert!(!entry.is_endpoint());
        assert!(!entry.is_swap_disabled());
        assert_eq!(entry.find_index_and_rank("n3"), Some((2, 1)));
        assert_eq!(entry.neighbor(-1).map(String::as_str), Some("n1"));
        assert_eq!(entry.neighbor(1).map(String::as_str), Some("n3"));
        assert_eq!(entry.segment_name("n1").unwrap(), "n1-n2");
        assert_eq!(entry.segment_name("n3").unwrap(), "n2-n3");

        let end = FibEntry::from_instructions(0, &instructions(0), "n1", ACC).unwrap();
        assert!(end.is_endpoint());
        assert_eq!(end.neighbor(-1), None);
    }

    #[test]
    fn test_reinstall_is_field_for_field_idempotent() {
        let mut fib = Fib::new();
        let a = FibEntry::from_instructions(0, &instructions(0), "n2", ACC).unwrap();
        fib.insert_or_replace(a.clone());
        fib.insert_or_replace(FibEntry::from_instructions(0, &instructions(0), "n2", ACC).unwrap());
        assert_eq!(fib.get(0), Some(&a));
        assert_eq!(fib.path_ids_by_request(0), BTreeSet::from([0]));
    }

    #[test]
    fn test_request_group_tracks_multipath() {
        let mut fib = Fib::new();
        fib.insert_or_replace(FibEntry::from_instructions(0, &instructions(7), "n2", ACC).unwrap());
        fib.insert_or_replace(FibEntry::from_instructions(1, &instructions(7), "n2", ACC).unwrap());
        assert_eq!(fib.path_ids_by_request(7), BTreeSet::from([0, 1]));
        assert!(fib.has_request("n1", "n3"));

        fib.erase(0);
        assert!(fib.has_request("n1", "n3"));
        fib.erase(1);
        assert!(!fib.has_request("n1", "n3"));
        assert!(fib.is_empty());
    }

    #[test]
    fn test_erase_unknown_path_is_silent() {
        let mut fib = Fib::new();
        fib.erase(42);
        assert!(fib.is_empty());
    }
}
