//! Deferred configuration queue.
//!
//! Some record kinds cannot fill all their fields at construction: a
//! method's return type may be the class instance that owns it, which must
//! already be registered in the index before the type can be stored. The
//! construction site captures the AST-derived values eagerly into a task
//! and appends it here; the linkage drains the queue FIFO right after the
//! record is registered, and keeps draining because a task may enqueue
//! follow-up work (implicit members after a class definition configures).
//!
//! Single-writer: the queue belongs to one linkage and is never shared
//! across threads.

use pdom_ast::{FunctionFacet, ImplicitSet, Visibility};
use pdom_common::RecordRef;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub enum DeferredTask {
    /// Fill a function-kind record's parameter list, function type,
    /// exception specification, and execution blob.
    ConfigureFunction { record: RecordRef, facet: FunctionFacet },
    /// Diff-synthesize the implicit special members a class definition
    /// implies against what is persisted.
    SynthesizeImplicitMembers {
        class: RecordRef,
        implied: ImplicitSet,
        class_name: Vec<u8>,
        visibility: Visibility,
    },
}

#[derive(Debug, Default)]
pub struct DeferredQueue {
    tasks: VecDeque<DeferredTask>,
}

impl DeferredQueue {
    pub fn new() -> DeferredQueue {
        DeferredQueue::default()
    }

    pub fn push(&mut self, task: DeferredTask) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<DeferredTask> {
        self.tasks.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}
