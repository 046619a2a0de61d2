//! Data path: read, write, truncate
//!
//! All offsets handed to these managers are fragment-space values derived
//! from stripe-aligned logical ranges; the facade does the alignment and
//! the read-modify-write. Fragments from different nodes differ by
//! design, so read replies combine on length alone and the winning
//! group's payloads are fed through the erasure decoder, using each
//! member's node index as its fragment row.

use crate::answer::{AnswerGroup, NodeAnswer, OpPayload};
use crate::manager::{OpManager, Quorum};
use crate::ops::attr::scale_attr;
use crate::ops::Nodes;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use stripefs_common::{Errno, FileId};
use stripefs_erasure::ErasureCoder;
use tracing::warn;

pub struct ReadManager {
    nodes: Nodes,
    coder: Arc<ErasureCoder>,
    file: FileId,
    /// Fragment-space offset of the aligned range.
    frag_offset: u64,
    /// Fragment-space length of the aligned range.
    frag_len: u64,
}

impl ReadManager {
    #[must_use]
    pub fn new(
        nodes: Nodes,
        coder: Arc<ErasureCoder>,
        file: FileId,
        frag_offset: u64,
        frag_len: u64,
    ) -> Self {
        Self {
            nodes,
            coder,
            file,
            frag_offset,
            frag_len,
        }
    }
}

#[async_trait]
impl OpManager for ReadManager {
    fn name(&self) -> &'static str {
        "read"
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        self.nodes[node]
            .read(self.file, self.frag_offset, self.frag_len)
            .await
            .map(OpPayload::Data)
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        // Fragment bytes differ per node; agreement means equal length.
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Data(a)), Ok(OpPayload::Data(b))) => a.len() == b.len(),
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        // A merged selection can mix fragment lengths, which the
        // decoder must never see.
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        let k = self.coder.columns();
        let mut rows = Vec::with_capacity(k);
        let mut inputs: Vec<&[u8]> = Vec::with_capacity(k);
        for answer in group.answers.iter().take(k) {
            match &answer.res {
                Ok(OpPayload::Data(data)) => {
                    rows.push(answer.node);
                    inputs.push(data);
                }
                _ => return Err(Errno::EIO),
            }
        }
        match self.coder.merge(&rows, &inputs) {
            Ok(buf) => Ok(OpPayload::Data(Bytes::from(buf))),
            Err(err) => {
                warn!(file = %self.file, %err, "fragment merge failed");
                Err(err.errno())
            }
        }
    }
}

pub struct WriteManager {
    nodes: Nodes,
    file: FileId,
    /// Fragment-space offset of the aligned range.
    frag_offset: u64,
    /// Per-row fragment payloads, one per node index.
    fragments: Vec<Bytes>,
    /// Logical file size after this write, recorded on every node.
    logical_size: u64,
    /// Logical bytes the caller asked to write, reported on success.
    written: u64,
}

impl WriteManager {
    #[must_use]
    pub fn new(
        nodes: Nodes,
        file: FileId,
        frag_offset: u64,
        fragments: Vec<Bytes>,
        logical_size: u64,
        written: u64,
    ) -> Self {
        Self {
            nodes,
            file,
            frag_offset,
            fragments,
            logical_size,
            written,
        }
    }
}

#[async_trait]
impl OpManager for WriteManager {
    fn name(&self) -> &'static str {
        "write"
    }

    fn quorum(&self) -> Quorum {
        // A fragment quorum of acknowledged writes would silently shed
        // redundancy; every reachable node must take the stripe.
        Quorum::All
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        self.nodes[node]
            .write(
                self.file,
                self.frag_offset,
                self.fragments[node].clone(),
                self.logical_size,
            )
            .await
            .map(OpPayload::Written)
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Written(a)), Ok(OpPayload::Written(b))) => a == b,
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        match &group.representative().res {
            Ok(OpPayload::Written(_)) => Ok(OpPayload::Written(self.written)),
            Ok(_) => Err(Errno::EIO),
            Err(errno) => Err(*errno),
        }
    }
}

pub struct TruncateManager {
    nodes: Nodes,
    file: FileId,
    /// Fragment-space length each node truncates its fragment to.
    fragment_len: u64,
    /// Logical size recorded in the size xattr.
    logical_size: u64,
    /// K, for rescaling the returned attributes.
    fragments: usize,
}

impl TruncateManager {
    #[must_use]
    pub fn new(
        nodes: Nodes,
        file: FileId,
        fragment_len: u64,
        logical_size: u64,
        fragments: usize,
    ) -> Self {
        Self {
            nodes,
            file,
            fragment_len,
            logical_size,
            fragments,
        }
    }
}

#[async_trait]
impl OpManager for TruncateManager {
    fn name(&self) -> &'static str {
        "truncate"
    }

    fn quorum(&self) -> Quorum {
        Quorum::All
    }

    async fn dispatch(&self, node: usize) -> Result<OpPayload, Errno> {
        self.nodes[node]
            .truncate(self.file, self.fragment_len, self.logical_size)
            .await
            .map(OpPayload::Attr)
    }

    fn combine(&self, rep: &NodeAnswer, answer: &NodeAnswer) -> bool {
        match (&rep.res, &answer.res) {
            (Ok(OpPayload::Attr(a)), Ok(OpPayload::Attr(b))) => a.matches(b),
            _ => false,
        }
    }

    fn rebuild(&self, group: &AnswerGroup) -> Result<OpPayload, Errno> {
        if !group.uniform(|rep, answer| self.combine(rep, answer)) {
            return Err(Errno::EIO);
        }
        match &group.representative().res {
            Ok(OpPayload::Attr(attr)) => Ok(OpPayload::Attr(scale_attr(
                attr,
                self.fragments,
                Some(self.logical_size),
            ))),
            Ok(_) => Err(Errno::EIO),
            Err(errno) => Err(*errno),
        }
    }
}
