//! On-database binary search index.
//!
//! Scope indices are binary trees stored in the database itself: each tree
//! node is a small record `[left][right][payload]` where `payload` is the
//! record of an indexed binding. Ordering comes from an externally supplied
//! comparator, so one tree implementation serves every scope kind.
//!
//! Tree mutation returns the (possibly changed) root; the owning record is
//! responsible for storing the new root back into its index field.
//!
//! Ties compare as `Equal` and are inserted to the right, so duplicate keys
//! chain deterministically and searches steered by a visitor's `compare`
//! visit every member of an equal run in insertion order.

use crate::db::Database;
use pdom_common::{RecordRef, Result};
use std::cmp::Ordering;

const LEFT: u64 = 0;
const RIGHT: u64 = 8;
const PAYLOAD: u64 = 16;
const NODE_SIZE: u32 = 24;

/// Total order over indexed payload records.
pub trait IndexComparator {
    fn compare(&self, db: &Database, a: RecordRef, b: RecordRef) -> Result<Ordering>;
}

/// Steered traversal over an index tree.
///
/// `compare` positions the visitor relative to a node's payload (`Less`
/// means the payload sorts before what the visitor wants, so only the right
/// subtree is interesting). `visit` is called for every payload that
/// compares `Equal`; returning `Ok(false)` stops the traversal.
/// Cancellation raised inside `visit` propagates out as an error and must
/// not be swallowed here.
pub trait IndexVisitor {
    fn compare(&self, db: &Database, payload: RecordRef) -> Result<Ordering>;
    fn visit(&mut self, db: &Database, payload: RecordRef) -> Result<bool>;
}

/// Inserts `payload` and returns the new root.
pub fn insert(
    db: &mut Database,
    root: RecordRef,
    payload: RecordRef,
    cmp: &dyn IndexComparator,
) -> Result<RecordRef> {
    if root.is_null() {
        let node = db.malloc(NODE_SIZE)?;
        db.put_rec(node, PAYLOAD, payload)?;
        return Ok(node);
    }
    let here = db.get_rec(root, PAYLOAD)?;
    match cmp.compare(db, payload, here)? {
        Ordering::Less => {
            let left = db.get_rec(root, LEFT)?;
            let left = insert(db, left, payload, cmp)?;
            db.put_rec(root, LEFT, left)?;
        }
        // Equal goes right: duplicates chain in insertion order.
        Ordering::Greater | Ordering::Equal => {
            let right = db.get_rec(root, RIGHT)?;
            let right = insert(db, right, payload, cmp)?;
            db.put_rec(root, RIGHT, right)?;
        }
    }
    Ok(root)
}

/// Removes the node holding exactly `payload` (by record identity) and
/// returns the new root. Absent payloads are a no-op.
pub fn delete(
    db: &mut Database,
    root: RecordRef,
    payload: RecordRef,
    cmp: &dyn IndexComparator,
) -> Result<RecordRef> {
    if root.is_null() {
        return Ok(root);
    }
    let here = db.get_rec(root, PAYLOAD)?;
    if here == payload {
        return unlink(db, root);
    }
    match cmp.compare(db, payload, here)? {
        Ordering::Less => {
            let left = db.get_rec(root, LEFT)?;
            let left = delete(db, left, payload, cmp)?;
            db.put_rec(root, LEFT, left)?;
        }
        // An equal-but-different payload sits in the right subtree, same as
        // where insert would have sent it.
        Ordering::Greater | Ordering::Equal => {
            let right = db.get_rec(root, RIGHT)?;
            let right = delete(db, right, payload, cmp)?;
            db.put_rec(root, RIGHT, right)?;
        }
    }
    Ok(root)
}

fn unlink(db: &mut Database, node: RecordRef) -> Result<RecordRef> {
    let left = db.get_rec(node, LEFT)?;
    let right = db.get_rec(node, RIGHT)?;
    let replacement = if left.is_null() {
        right
    } else if right.is_null() {
        left
    } else {
        // Promote the in-order successor's payload into this node.
        let (right, successor) = take_leftmost(db, right)?;
        db.put_rec(node, PAYLOAD, successor)?;
        db.put_rec(node, RIGHT, right)?;
        return Ok(node);
    };
    db.free(node)?;
    Ok(replacement)
}

/// Removes the leftmost node of a non-null subtree, returning the new
/// subtree root and the removed payload.
fn take_leftmost(db: &mut Database, node: RecordRef) -> Result<(RecordRef, RecordRef)> {
    let left = db.get_rec(node, LEFT)?;
    if left.is_null() {
        let payload = db.get_rec(node, PAYLOAD)?;
        let right = db.get_rec(node, RIGHT)?;
        db.free(node)?;
        Ok((right, payload))
    } else {
        let (new_left, payload) = take_leftmost(db, left)?;
        db.put_rec(node, LEFT, new_left)?;
        Ok((node, payload))
    }
}

/// Steered in-order traversal. Returns `false` when a visitor stopped early.
pub fn accept(db: &Database, root: RecordRef, visitor: &mut dyn IndexVisitor) -> Result<bool> {
    if root.is_null() {
        return Ok(true);
    }
    let payload = db.get_rec(root, PAYLOAD)?;
    match visitor.compare(db, payload)? {
        Ordering::Less => {
            // Payload sorts before the target; matches can only be right.
            accept(db, db.get_rec(root, RIGHT)?, visitor)
        }
        Ordering::Greater => accept(db, db.get_rec(root, LEFT)?, visitor),
        Ordering::Equal => {
            if !accept(db, db.get_rec(root, LEFT)?, visitor)? {
                return Ok(false);
            }
            if !visitor.visit(db, payload)? {
                return Ok(false);
            }
            accept(db, db.get_rec(root, RIGHT)?, visitor)
        }
    }
}

/// Unsteered traversal: visits every payload in comparator order.
pub fn visit_all(
    db: &Database,
    root: RecordRef,
    visit: &mut dyn FnMut(&Database, RecordRef) -> Result<bool>,
) -> Result<bool> {
    if root.is_null() {
        return Ok(true);
    }
    if !visit_all(db, db.get_rec(root, LEFT)?, visit)? {
        return Ok(false);
    }
    if !visit(db, db.get_rec(root, PAYLOAD)?)? {
        return Ok(false);
    }
    visit_all(db, db.get_rec(root, RIGHT)?, visit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdom_common::PdomError;

    /// Orders payloads by a stored i32 key at offset 0.
    struct IntCmp;
    impl IndexComparator for IntCmp {
        fn compare(&self, db: &Database, a: RecordRef, b: RecordRef) -> Result<Ordering> {
            Ok(db.get_int(a, 0)?.cmp(&db.get_int(b, 0)?))
        }
    }

    fn payload(db: &mut Database, key: i32) -> RecordRef {
        let rec = db.malloc(4).unwrap();
        db.put_int(rec, 0, key).unwrap();
        rec
    }

    fn collect(db: &Database, root: RecordRef) -> Vec<i32> {
        let mut out = Vec::new();
        visit_all(db, root, &mut |db, rec| {
            out.push(db.get_int(rec, 0)?);
            Ok(true)
        })
        .unwrap();
        out
    }

    #[test]
    fn test_insert_orders_payloads() {
        let mut db = Database::new();
        let mut root = RecordRef::NULL;
        for key in [5, 1, 9, 3, 7, 1] {
            let p = payload(&mut db, key);
            root = insert(&mut db, root, p, &IntCmp).unwrap();
        }
        assert_eq!(collect(&db, root), vec![1, 1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_delete_by_identity_among_duplicates() {
        let mut db = Database::new();
        let mut root = RecordRef::NULL;
        let first = payload(&mut db, 4);
        let second = payload(&mut db, 4);
        for p in [first, second] {
            root = insert(&mut db, root, p, &IntCmp).unwrap();
        }
        root = delete(&mut db, root, first, &IntCmp).unwrap();
        let mut survivors = Vec::new();
        visit_all(&db, root, &mut |_, rec| {
            survivors.push(rec);
            Ok(true)
        })
        .unwrap();
        assert_eq!(survivors, vec![second]);
    }

    #[test]
    fn test_delete_interior_node_keeps_order() {
        let mut db = Database::new();
        let mut root = RecordRef::NULL;
        let mut recs = Vec::new();
        for key in [50, 20, 80, 10, 30, 70, 90] {
            let p = payload(&mut db, key);
            recs.push((key, p));
            root = insert(&mut db, root, p, &IntCmp).unwrap();
        }
        let (_, doomed) = recs.iter().find(|(k, _)| *k == 20).copied().unwrap();
        root = delete(&mut db, root, doomed, &IntCmp).unwrap();
        assert_eq!(collect(&db, root), vec![10, 30, 50, 70, 80, 90]);
        let (_, doomed) = recs.iter().find(|(k, _)| *k == 50).copied().unwrap();
        root = delete(&mut db, root, doomed, &IntCmp).unwrap();
        assert_eq!(collect(&db, root), vec![10, 30, 70, 80, 90]);
    }

    #[test]
    fn test_accept_steers_to_equal_run() {
        struct FindKey {
            key: i32,
            hits: Vec<RecordRef>,
        }
        impl IndexVisitor for FindKey {
            fn compare(&self, db: &Database, payload: RecordRef) -> Result<Ordering> {
                Ok(db.get_int(payload, 0)?.cmp(&self.key))
            }
            fn visit(&mut self, _db: &Database, payload: RecordRef) -> Result<bool> {
                self.hits.push(payload);
                Ok(true)
            }
        }
        let mut db = Database::new();
        let mut root = RecordRef::NULL;
        let mut fours = Vec::new();
        for key in [2, 4, 6, 4, 8, 4] {
            let p = payload(&mut db, key);
            if key == 4 {
                fours.push(p);
            }
            root = insert(&mut db, root, p, &IntCmp).unwrap();
        }
        let mut finder = FindKey { key: 4, hits: Vec::new() };
        accept(&db, root, &mut finder).unwrap();
        assert_eq!(finder.hits.len(), 3);
        for hit in &finder.hits {
            assert!(fours.contains(hit));
        }
    }

    #[test]
    fn test_visitor_cancellation_propagates() {
        struct Cancelling;
        impl IndexVisitor for Cancelling {
            fn compare(&self, _: &Database, _: RecordRef) -> Result<Ordering> {
                Ok(Ordering::Equal)
            }
            fn visit(&mut self, _: &Database, _: RecordRef) -> Result<bool> {
                Err(PdomError::Cancelled)
            }
        }
        let mut db = Database::new();
        let p = payload(&mut db, 1);
        let root = insert(&mut db, RecordRef::NULL, p, &IntCmp).unwrap();
        assert_eq!(accept(&db, root, &mut Cancelling), Err(PdomError::Cancelled));
    }
}
