//! Word lattice graph consumed by the decoder.
//!
//! Nodes and links live in arenas and refer to each other by index. The
//! graph is read-only once built; per-decode bookkeeping lives in the
//! decoder.

pub mod slf;

use std::io;

pub use slf::{read_slf, read_slf_file};

pub type NodeId = usize;
pub type LinkId = usize;

/// Words starting with this prefix (`!NULL`, `!ENTER`, `!EXIT`, ...) mark
/// structural links that carry no vocabulary word.
pub const NULL_WORD_PREFIX: char = '!';

#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("link {link} refers to node {node}, but the lattice has {num_nodes} nodes")]
    NodeOutOfRange {
        link: LinkId,
        node: NodeId,
        num_nodes: usize,
    },

    #[error("lattice has no initial node")]
    MissingInitialNode,

    #[error("lattice has no final node")]
    MissingFinalNode,

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("lattice has a cycle through {num_nodes} nodes")]
    Cycle { num_nodes: usize },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Time in seconds, when the lattice provides it.
    pub time: Option<f64>,
    pub out_links: Vec<LinkId>,
    pub in_links: Vec<LinkId>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub word: String,
    /// Natural-log acoustic score.
    pub ac_logprob: Option<f64>,
    /// Natural-log language model score.
    pub lm_logprob: Option<f64>,
}

impl Link {
    /// True for `!NULL` and similar structural links.
    pub fn is_null(&self) -> bool {
        self.word.starts_with(NULL_WORD_PREFIX)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lattice {
    pub utterance_id: Option<String>,
    /// LM scale requested by the lattice header.
    pub lm_scale: Option<f64>,
    /// Word insertion penalty requested by the lattice header.
    pub wi_penalty: Option<f64>,
    nodes: Vec<Node>,
    links: Vec<Link>,
    initial_node: Option<NodeId>,
    final_node: Option<NodeId>,
}

impl Lattice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, time: Option<f64>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            time,
            out_links: Vec::new(),
            in_links: Vec::new(),
        });
        id
    }

    pub fn add_link(
        &mut self,
        start_node: NodeId,
        end_node: NodeId,
        word: &str,
        ac_logprob: Option<f64>,
        lm_logprob: Option<f64>,
    ) -> Result<LinkId, LatticeError> {
        let id = self.links.len();
        for node in [start_node, end_node] {
            if node >= self.nodes.len() {
                return Err(LatticeError::NodeOutOfRange {
                    link: id,
                    node,
                    num_nodes: self.nodes.len(),
                });
            }
        }
        self.links.push(Link {
            id,
            start_node,
            end_node,
            word: word.to_string(),
            ac_logprob,
            lm_logprob,
        });
        self.nodes[start_node].out_links.push(id);
        self.nodes[end_node].in_links.push(id);
        Ok(id)
    }

    pub fn set_initial_node(&mut self, node: NodeId) {
        self.initial_node = Some(node);
    }

    pub fn set_final_node(&mut self, node: NodeId) {
        self.final_node = Some(node);
    }

    pub fn initial_node(&self) -> Result<NodeId, LatticeError> {
        self.initial_node.ok_or(LatticeError::MissingInitialNode)
    }

    pub fn final_node(&self) -> Result<NodeId, LatticeError> {
        self.final_node.ok_or(LatticeError::MissingFinalNode)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// Every node in topological order.
    ///
    /// Among nodes that are ready at the same time, the one with the earliest
    /// time (untimed nodes last), then the lowest id, comes first. Nodes that
    /// cannot be reached from the initial node are included, so the decoder
    /// finds them without tokens.
    pub fn sorted_nodes(&self) -> Result<Vec<NodeId>, LatticeError> {
        self.initial_node()?;

        let mut pending_in: Vec<usize> = self.nodes.iter().map(|n| n.in_links.len()).collect();
        let mut ready: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&id| pending_in[id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while !ready.is_empty() {
            let next = (0..ready.len())
                .min_by(|&i, &j| self.ready_order(ready[i], ready[j]))
                .unwrap_or(0);
            let id = ready.swap_remove(next);
            order.push(id);
            for &link in &self.nodes[id].out_links {
                let end = self.links[link].end_node;
                pending_in[end] -= 1;
                if pending_in[end] == 0 {
                    ready.push(end);
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(LatticeError::Cycle {
                num_nodes: self.nodes.len() - order.len(),
            });
        }
        Ok(order)
    }

    fn ready_order(&self, a: NodeId, b: NodeId) -> std::cmp::Ordering {
        let time = |id: NodeId| self.nodes[id].time.unwrap_or(f64::INFINITY);
        time(a).total_cmp(&time(b)).then(a.cmp(&b))
    }
}
