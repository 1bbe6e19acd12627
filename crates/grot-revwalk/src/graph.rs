//! The commit graph: node arena, open-branch frontier, and the sorted
//! candidate list driving iteration.

use grot_hash::{ObjectId, ObjectIdSet};
use grot_object::Commit;

use crate::GraphError;

/// Supplies parsed commits by id.
pub trait CommitReader {
    fn read_commit(&self, id: &ObjectId) -> Result<Commit, GraphError>;
}

/// One discovered commit. Child links are stored as ids and resolved
/// through the arena, so merge diamonds cannot form ownership cycles.
struct Node {
    commit: Commit,
    committer_time: i64,
    child_ids: Vec<ObjectId>,
}

/// A candidate for the next commit to emit.
struct Candidate {
    id: ObjectId,
    committer_time: i64,
}

/// The commit graph built outward from one starting commit.
pub struct CommitGraph {
    /// Every commit traversed so far, keyed by id.
    nodes: ObjectIdSet<Node>,
    /// Parent ids referenced by traversed commits but not yet opened.
    /// Each maps to the child commit that discovered it.
    open_branches: ObjectIdSet<ObjectId>,
    /// Sorted candidate list: committer time descending, discovery
    /// order within equal times.
    candidates: Vec<Candidate>,
    /// The node the iterator will yield next.
    iter_node: Option<ObjectId>,
}

impl CommitGraph {
    /// Build a graph rooted at `id`. The commit is opened immediately
    /// and its parents become the first open branches.
    pub fn open(id: ObjectId, reader: &dyn CommitReader) -> Result<Self, GraphError> {
        let commit = reader.read_commit(&id)?;
        let mut graph = Self {
            nodes: ObjectIdSet::new(),
            open_branches: ObjectIdSet::new(),
            candidates: Vec::new(),
            iter_node: None,
        };
        graph.add_node(id, commit, None)?;
        Ok(graph)
    }

    /// Number of parent ids waiting to be fetched.
    pub fn num_open_branches(&self) -> usize {
        self.open_branches.len()
    }

    /// Number of commits traversed so far.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The parsed commit for a traversed id.
    pub fn get_commit(&self, id: &ObjectId) -> Option<&Commit> {
        self.nodes.get(id).map(|n| &n.commit)
    }

    /// Pull up to `limit` commits from the currently open branches.
    /// Returns how many commits were added.
    pub fn fetch(&mut self, limit: usize, reader: &dyn CommitReader) -> Result<usize, GraphError> {
        let mut total = 0usize;
        while total < limit {
            let fetched = self.fetch_from_open_branches(reader)?;
            if fetched == 0 {
                break;
            }
            total += fetched;
        }
        Ok(total)
    }

    /// One round: open every branch in the current frontier.
    ///
    /// Adding nodes mutates the frontier, so the round works off a
    /// snapshot of it.
    fn fetch_from_open_branches(
        &mut self,
        reader: &dyn CommitReader,
    ) -> Result<usize, GraphError> {
        let branches: Vec<(ObjectId, ObjectId)> = self
            .open_branches
            .iter()
            .map(|(parent, child)| (*parent, *child))
            .collect();
        if branches.is_empty() {
            return Ok(0);
        }

        let mut ncommits = 0usize;
        for (commit_id, child_id) in branches {
            let commit = reader.read_commit(&commit_id)?;
            if self.add_node(commit_id, commit, Some(child_id))? {
                ncommits += 1;
            }
        }
        Ok(ncommits)
    }

    /// Insert a commit into the arena, keep the candidate list and the
    /// open-branch frontier in sync, and link the discovering child.
    ///
    /// Returns true when the node is new.
    fn add_node(
        &mut self,
        commit_id: ObjectId,
        commit: Commit,
        child_id: Option<ObjectId>,
    ) -> Result<bool, GraphError> {
        let mut is_new = false;

        if self.nodes.get(&commit_id).is_none() {
            let committer_time = commit.committer_time()?;
            let parents = commit.parents.clone();

            self.nodes
                .add(
                    commit_id,
                    Node {
                        commit,
                        committer_time,
                        child_ids: Vec::new(),
                    },
                )
                .ok()
                .expect("checked for absence above");
            self.add_candidate(commit_id, committer_time);

            // This id is no longer an open branch; its untraversed
            // parents are.
            let _ = self.open_branches.remove(&commit_id);
            for parent in parents {
                if self.nodes.contains(&parent) {
                    continue; // parent already traversed
                }
                // An already-open branch stays linked to its first
                // discovering child.
                let _ = self.open_branches.add(parent, commit_id);
            }
            is_new = true;
        }

        if let Some(child) = child_id {
            if child == commit_id {
                return Err(GraphError::BadObjectId(commit_id));
            }
            let node = self
                .nodes
                .get_mut(&commit_id)
                .expect("node inserted or pre-existing");
            if node.child_ids.contains(&child) {
                return Err(GraphError::BadObjectId(commit_id));
            }
            node.child_ids.push(child);
        }

        Ok(is_new)
    }

    /// Insert into the candidate list: before every candidate with a
    /// strictly smaller time, after every candidate with a greater or
    /// equal one.
    fn add_candidate(&mut self, id: ObjectId, committer_time: i64) {
        let pos = self
            .candidates
            .partition_point(|c| c.committer_time >= committer_time);
        self.candidates.insert(
            pos,
            Candidate {
                id,
                committer_time,
            },
        );
    }

    /// Position the iterator on a traversed commit and reseed the
    /// candidate list with that commit's already-known parents.
    pub fn iter_start(&mut self, id: &ObjectId) -> Result<(), GraphError> {
        let node = self.nodes.get(id).ok_or(GraphError::NoObject(*id))?;
        let parents = node.commit.parents.clone();

        self.iter_node = Some(*id);
        self.candidates.clear();
        for parent in parents {
            if let Some(pnode) = self.nodes.get(&parent) {
                let time = pnode.committer_time;
                self.add_candidate(parent, time);
            }
        }
        Ok(())
    }

    /// Yield the current commit and advance to the best candidate.
    ///
    /// `Ok(None)` ends the iteration. `Err(NeedMore)` asks the caller
    /// to fetch more commits first.
    pub fn iter_next(&mut self) -> Result<Option<(ObjectId, &Commit)>, GraphError> {
        let Some(current) = self.iter_node else {
            return Ok(None); // iteration finished or never started
        };

        if self.candidates.is_empty() {
            let node = self
                .nodes
                .get(&current)
                .expect("iterator positioned on traversed node");
            if node.commit.is_root() && self.open_branches.is_empty() {
                self.iter_node = None;
                let node = self.nodes.get(&current).expect("node still present");
                return Ok(Some((current, &node.commit)));
            }
            return Err(GraphError::NeedMore);
        }

        let next = self.candidates.remove(0);
        self.iter_node = Some(next.id);
        let node = self
            .nodes
            .get(&current)
            .expect("iterator positioned on traversed node");
        Ok(Some((current, &node.commit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    struct MapReader {
        commits: HashMap<ObjectId, Commit>,
    }

    impl MapReader {
        fn new() -> Self {
            Self {
                commits: HashMap::new(),
            }
        }

        fn commit(&mut self, id: ObjectId, parents: &[ObjectId], time: i64) {
            let mut raw = Vec::new();
            raw.extend_from_slice(
                b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n",
            );
            for p in parents {
                raw.extend_from_slice(format!("parent {}\n", p.to_hex()).as_bytes());
            }
            raw.extend_from_slice(
                format!("author A <a@b.com> {time} +0000\n").as_bytes(),
            );
            raw.extend_from_slice(
                format!("committer A <a@b.com> {time} +0000\n").as_bytes(),
            );
            raw.extend_from_slice(b"\nmsg\n");
            self.commits.insert(id, Commit::parse(&raw).unwrap());
        }
    }

    impl CommitReader for MapReader {
        fn read_commit(&self, id: &ObjectId) -> Result<Commit, GraphError> {
            self.commits
                .get(id)
                .cloned()
                .ok_or(GraphError::NoObject(*id))
        }
    }

    /// Drive the iterator to completion, fetching whenever asked.
    fn collect_log(graph: &mut CommitGraph, reader: &MapReader) -> Vec<ObjectId> {
        let mut out = Vec::new();
        loop {
            match graph.iter_next() {
                Ok(Some((id, _commit))) => out.push(id),
                Ok(None) => break,
                Err(GraphError::NeedMore) => {
                    graph.fetch(usize::MAX, reader).unwrap();
                }
                Err(e) => panic!("iteration failed: {e}"),
            }
        }
        out
    }

    #[test]
    fn linear_history_in_time_order() {
        let (a, b, c) = (oid(1), oid(2), oid(3));
        let mut reader = MapReader::new();
        reader.commit(a, &[], 10);
        reader.commit(b, &[a], 20);
        reader.commit(c, &[b], 30);

        let mut graph = CommitGraph::open(c, &reader).unwrap();
        graph.iter_start(&c).unwrap();
        assert_eq!(collect_log(&mut graph, &reader), vec![c, b, a]);
    }

    #[test]
    fn merge_orders_by_committer_time() {
        // A(10) -> B(20) -> M(30) and A -> C(25) -> M.
        // C precedes B because 25 > 20.
        let (a, b, c, m) = (oid(1), oid(2), oid(3), oid(4));
        let mut reader = MapReader::new();
        reader.commit(a, &[], 10);
        reader.commit(b, &[a], 20);
        reader.commit(c, &[a], 25);
        reader.commit(m, &[b, c], 30);

        let mut graph = CommitGraph::open(m, &reader).unwrap();
        graph.iter_start(&m).unwrap();
        assert_eq!(collect_log(&mut graph, &reader), vec![m, c, b, a]);
    }

    #[test]
    fn every_reachable_commit_appears_once() {
        // A diamond with an extra tail.
        let (r, a, b, c, m, tip) = (oid(1), oid(2), oid(3), oid(4), oid(5), oid(6));
        let mut reader = MapReader::new();
        reader.commit(r, &[], 1);
        reader.commit(a, &[r], 10);
        reader.commit(b, &[a], 20);
        reader.commit(c, &[a], 21);
        reader.commit(m, &[b, c], 30);
        reader.commit(tip, &[m], 40);

        let mut graph = CommitGraph::open(tip, &reader).unwrap();
        graph.iter_start(&tip).unwrap();
        let log = collect_log(&mut graph, &reader);

        assert_eq!(log.len(), 6);
        let mut dedup = log.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 6, "no commit repeats");

        // Committer times never increase along the output.
        let times: Vec<i64> = log
            .iter()
            .map(|id| graph.get_commit(id).unwrap().committer_time().unwrap())
            .collect();
        assert!(times.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn equal_times_keep_discovery_order() {
        let (a, b, c, m) = (oid(1), oid(2), oid(3), oid(4));
        let mut reader = MapReader::new();
        reader.commit(a, &[], 10);
        reader.commit(b, &[a], 20);
        reader.commit(c, &[a], 20);
        reader.commit(m, &[b, c], 30);

        let mut graph = CommitGraph::open(m, &reader).unwrap();
        graph.iter_start(&m).unwrap();
        let log = collect_log(&mut graph, &reader);
        assert_eq!(log[0], m);
        assert_eq!(log[3], a);
        // B and C share a timestamp; whichever was discovered first
        // stays first, and the order is stable across runs.
        let first: Vec<ObjectId> = log.clone();
        let mut graph2 = CommitGraph::open(m, &reader).unwrap();
        graph2.iter_start(&m).unwrap();
        assert_eq!(collect_log(&mut graph2, &reader), first);
    }

    #[test]
    fn fetch_honors_limit() {
        let (a, b, c) = (oid(1), oid(2), oid(3));
        let mut reader = MapReader::new();
        reader.commit(a, &[], 10);
        reader.commit(b, &[a], 20);
        reader.commit(c, &[b], 30);

        let mut graph = CommitGraph::open(c, &reader).unwrap();
        let n = graph.fetch(1, &reader).unwrap();
        assert_eq!(n, 1);
        assert_eq!(graph.num_nodes(), 2);
        let n = graph.fetch(10, &reader).unwrap();
        assert_eq!(n, 1);
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_open_branches(), 0);
    }

    #[test]
    fn iter_start_requires_known_node() {
        let a = oid(1);
        let mut reader = MapReader::new();
        reader.commit(a, &[], 10);
        let mut graph = CommitGraph::open(a, &reader).unwrap();
        assert!(matches!(
            graph.iter_start(&oid(99)),
            Err(GraphError::NoObject(_))
        ));
    }

    #[test]
    fn malformed_committer_line_is_bad_obj_data() {
        let a = oid(1);
        let mut reader = MapReader::new();
        let raw = b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n\
author A <a@b.com> 1 +0000\n\
committer broken\n\nmsg\n";
        reader
            .commits
            .insert(a, Commit::parse(raw.as_slice()).unwrap());
        assert!(matches!(
            CommitGraph::open(a, &reader),
            Err(GraphError::Object(_))
        ));
    }

    #[test]
    fn self_link_is_rejected() {
        let a = oid(1);
        let mut reader = MapReader::new();
        reader.commit(a, &[], 10);
        let mut graph = CommitGraph::open(a, &reader).unwrap();
        let commit = reader.read_commit(&a).unwrap();
        assert!(matches!(
            graph.add_node(a, commit, Some(a)),
            Err(GraphError::BadObjectId(_))
        ));
    }

    #[test]
    fn duplicate_child_link_is_rejected() {
        let (a, b) = (oid(1), oid(2));
        let mut reader = MapReader::new();
        reader.commit(a, &[], 10);
        reader.commit(b, &[a], 20);

        let mut graph = CommitGraph::open(b, &reader).unwrap();
        graph.fetch(usize::MAX, &reader).unwrap(); // links a -> b
        let commit = reader.read_commit(&a).unwrap();
        assert!(matches!(
            graph.add_node(a, commit, Some(b)),
            Err(GraphError::BadObjectId(_))
        ));
    }
}
