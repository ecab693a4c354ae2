//! Directed network view and traversal.
//!
//! `NetworkGraph` is a read-only adjacency view derived from the assign
//! table's `downstream_id` links. Both walks are iterative with explicit
//! worklists and visited sets: recursion depth on a large basin would be
//! bounded only by the longest upstream path, and an unguarded walk over a
//! malformed (cyclic) network would never terminate. Revisiting an id is
//! reported as a `CyclicNetwork` precondition failure.
//!
//! Hop ordering is a contract, not an accident: both walks return sequences
//! in which every id at hop distance d precedes every id at distance d+1.
//! Propagation derives hop distance from sequence position, so any change
//! that breaks strict ordering silently changes assignment results.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::AssignError;
use crate::table::AssignTable;

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

/// Read-only adjacency derived from the segment table.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    /// `model_id` -> downstream `model_id`. Outlet links (sentinel or empty)
    /// are omitted; links to ids with no matching row are kept, and the
    /// walks treat them like the outlet.
    downstream: HashMap<i64, i64>,
    /// `model_id` -> upstream neighbor ids, in table row order.
    upstream: HashMap<i64, Vec<i64>>,
    /// `model_id` -> stream order.
    order: HashMap<i64, u32>,
}

impl NetworkGraph {
    pub fn from_table(table: &AssignTable, outlet_sentinel: i64) -> Self {
        let mut downstream = HashMap::with_capacity(table.len());
        let mut upstream: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut order = HashMap::with_capacity(table.len());

        for row in table.rows() {
            order.insert(row.model_id, row.stream_order);
            if let Some(next) = row.downstream_id {
                if next != outlet_sentinel {
                    downstream.insert(row.model_id, next);
                    upstream.entry(next).or_default().push(row.model_id);
                }
            }
        }

        NetworkGraph {
            downstream,
            upstream,
            order,
        }
    }

    pub fn stream_order(&self, model_id: i64) -> Option<u32> {
        self.order.get(&model_id).copied()
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Follow downstream links from `start`, returning the ids passed
    /// through in hop order. `start` itself is not included.
    ///
    /// Termination: reaching the outlet (sentinel or empty link) and hitting
    /// an id with no matching row are treated identically, the walk simply
    /// ends. With `same_order`, the walk also ends at the first segment of a
    /// different stream order, modeling the assumption that crossing a
    /// junction changes hydrologic character too much to keep propagating.
    pub fn walk_downstream(&self, start: i64, same_order: bool) -> Result<Vec<i64>, AssignError> {
        let start_order = self
            .stream_order(start)
            .ok_or(AssignError::UnknownModelId(start))?;

        let mut ids = Vec::new();
        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(start);

        let mut current = start;
        while let Some(&next) = self.downstream.get(&current) {
            let Some(next_order) = self.stream_order(next) else {
                break; // dangling link, same as reaching the outlet
            };
            if same_order && next_order != start_order {
                break;
            }
            if !visited.insert(next) {
                return Err(AssignError::CyclicNetwork(next));
            }
            ids.push(next);
            current = next;
        }
        Ok(ids)
    }

    /// Collect every id whose flow eventually reaches `start`, breadth-first
    /// over reversed links. The result always includes `start` (first
    /// element), contains no duplicates, and is hop-ordered; within one hop,
    /// neighbors appear in table row order. At a confluence each branch is
    /// explored independently via the shared worklist.
    pub fn walk_upstream(&self, start: i64, same_order: bool) -> Result<Vec<i64>, AssignError> {
        let start_order = self
            .stream_order(start)
            .ok_or(AssignError::UnknownModelId(start))?;

        let mut ids = vec![start];
        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(start);
        let mut queue: VecDeque<i64> = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let Some(parents) = self.upstream.get(&current) else {
                continue; // headwater segment
            };
            for &parent in parents {
                if same_order && self.stream_order(parent) != Some(start_order) {
                    continue;
                }
                // Every segment has a single downstream link, so each id can
                // be discovered through exactly one confluence; rediscovery
                // means the links loop back on themselves.
                if !visited.insert(parent) {
                    return Err(AssignError::CyclicNetwork(parent));
                }
                ids.push(parent);
                queue.push_back(parent);
            }
        }
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Preflight cycle check
    // -----------------------------------------------------------------------

    /// Verify the whole downstream graph is acyclic.
    ///
    /// Any cycle in an order-filtered subgraph is also a cycle here (the
    /// filter only removes nodes), so one whole-graph pass covers every
    /// traversal the pipeline will make. Runs in O(n): each id is cleared
    /// once and chains stop at previously cleared ids.
    pub fn check_acyclic(&self) -> Result<(), AssignError> {
        let mut ids: Vec<i64> = self.order.keys().copied().collect();
        ids.sort_unstable(); // deterministic cycle attribution

        let mut cleared: HashSet<i64> = HashSet::with_capacity(ids.len());
        for &id in &ids {
            if cleared.contains(&id) {
                continue;
            }
            let mut path = Vec::new();
            let mut on_path: HashSet<i64> = HashSet::new();
            let mut current = id;
            loop {
                if cleared.contains(&current) {
                    break;
                }
                if !on_path.insert(current) {
                    return Err(AssignError::CyclicNetwork(current));
                }
                path.push(current);
                match self.downstream.get(&current) {
                    Some(&next) if self.order.contains_key(&next) => current = next,
                    _ => break, // outlet or dangling link
                }
            }
            cleared.extend(path);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
