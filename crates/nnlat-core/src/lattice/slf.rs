//! Reader for the HTK Standard Lattice Format (SLF).
//!
//! Supports the subset the decoder needs: utterance id, LM scale, word
//! insertion penalty, log base, node times and words, and link words with
//! acoustic and LM scores. Scores are converted to natural log.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use super::{Lattice, LatticeError, NodeId};

/// Upper bound on node ids when the header declares no node count.
const MAX_NODES: usize = 1 << 24;

#[derive(Default)]
struct NodeInfo {
    time: Option<f64>,
    word: Option<String>,
}

struct LinkInfo {
    line: usize,
    start: NodeId,
    end: NodeId,
    word: Option<String>,
    ac: Option<f64>,
    lm: Option<f64>,
}

#[derive(Default)]
struct Header {
    utterance_id: Option<String>,
    lm_scale: Option<f64>,
    wi_penalty: Option<f64>,
    base: Option<f64>,
    start: Option<NodeId>,
    end: Option<NodeId>,
    num_nodes: Option<usize>,
}

pub fn read_slf_file(path: &Path) -> Result<Lattice, LatticeError> {
    let mut lattice = read_slf(BufReader::new(File::open(path)?))?;
    if lattice.utterance_id.is_none() {
        lattice.utterance_id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }
    Ok(lattice)
}

pub fn read_slf<R: BufRead>(reader: R) -> Result<Lattice, LatticeError> {
    let mut header = Header::default();
    let mut nodes: Vec<NodeInfo> = Vec::new();
    let mut links: Vec<LinkInfo> = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = split_fields(line, line_no)?;
        let err = |reason: String| LatticeError::Parse {
            line: line_no,
            reason,
        };

        if let Some((_, id)) = fields.iter().find(|(k, _)| *k == "I") {
            let id = node_id(id, "I", &header, line_no)?;
            if nodes.len() <= id {
                nodes.resize_with(id + 1, NodeInfo::default);
            }
            for (key, value) in &fields {
                match *key {
                    "t" | "time" => nodes[id].time = Some(parse_num(value, key, line_no)?),
                    "W" | "WORD" => nodes[id].word = Some(value.to_string()),
                    _ => {}
                }
            }
        } else if fields.iter().any(|(k, _)| *k == "J") {
            let mut start = None;
            let mut end = None;
            let mut link = LinkInfo {
                line: line_no,
                start: 0,
                end: 0,
                word: None,
                ac: None,
                lm: None,
            };
            for (key, value) in &fields {
                match *key {
                    "S" | "START" => start = Some(node_id(value, key, &header, line_no)?),
                    "E" | "END" => end = Some(node_id(value, key, &header, line_no)?),
                    "W" | "WORD" => link.word = Some(value.to_string()),
                    "a" | "acoustic" => link.ac = Some(parse_num(value, key, line_no)?),
                    "l" | "language" => link.lm = Some(parse_num(value, key, line_no)?),
                    _ => {}
                }
            }
            link.start = start.ok_or_else(|| err("link without start node".to_string()))?;
            link.end = end.ok_or_else(|| err("link without end node".to_string()))?;
            links.push(link);
        } else {
            for (key, value) in &fields {
                match *key {
                    "UTTERANCE" | "U" => header.utterance_id = Some(value.to_string()),
                    "lmscale" => header.lm_scale = Some(parse_num(value, key, line_no)?),
                    "wdpenalty" => header.wi_penalty = Some(parse_num(value, key, line_no)?),
                    "base" => header.base = Some(parse_num(value, key, line_no)?),
                    "start" => header.start = Some(parse_num(value, key, line_no)?),
                    "end" => header.end = Some(parse_num(value, key, line_no)?),
                    "N" | "NODES" => {
                        let n: usize = parse_num(value, key, line_no)?;
                        if n > MAX_NODES {
                            let reason = format!("{n} nodes is over the limit of {MAX_NODES}");
                            return Err(err(reason));
                        }
                        header.num_nodes = Some(n);
                    }
                    _ => debug!(line = line_no, key, "ignoring SLF field"),
                }
            }
        }
    }

    let log_scale = match header.base {
        None => 1.0,
        Some(base) if base > 0.0 && base != 1.0 => base.ln(),
        Some(base) => {
            return Err(LatticeError::Parse {
                line: 0,
                reason: format!("unsupported log base {base}"),
            })
        }
    };

    let num_nodes = header
        .num_nodes
        .unwrap_or(0)
        .max(nodes.len())
        .max(links.iter().map(|l| l.start.max(l.end) + 1).max().unwrap_or(0));
    nodes.resize_with(num_nodes, NodeInfo::default);

    let mut lattice = Lattice::new();
    lattice.utterance_id = header.utterance_id;
    lattice.lm_scale = header.lm_scale;
    lattice.wi_penalty = header.wi_penalty.map(|p| p * log_scale);
    for node in &nodes {
        lattice.add_node(node.time);
    }
    for link in links {
        let word = link
            .word
            .or_else(|| nodes[link.end].word.clone())
            .ok_or_else(|| LatticeError::Parse {
                line: link.line,
                reason: "link has no word and its end node has none either".to_string(),
            })?;
        lattice.add_link(
            link.start,
            link.end,
            &word,
            link.ac.map(|a| a * log_scale),
            link.lm.map(|l| l * log_scale),
        )?;
    }

    let initial = match header.start {
        Some(node) => node,
        None => endpoint(&lattice, |n| n.in_links.is_empty(), "initial")
            .ok_or(LatticeError::MissingInitialNode)?,
    };
    let final_node = match header.end {
        Some(node) => node,
        None => endpoint(&lattice, |n| n.out_links.is_empty(), "final")
            .ok_or(LatticeError::MissingFinalNode)?,
    };
    if initial >= lattice.num_nodes() {
        return Err(LatticeError::MissingInitialNode);
    }
    if final_node >= lattice.num_nodes() {
        return Err(LatticeError::MissingFinalNode);
    }
    lattice.set_initial_node(initial);
    lattice.set_final_node(final_node);
    Ok(lattice)
}

/// First node matching `pred`; warns when the choice is ambiguous.
fn endpoint(
    lattice: &Lattice,
    pred: impl Fn(&super::Node) -> bool,
    what: &str,
) -> Option<NodeId> {
    let mut candidates = lattice.nodes().iter().filter(|n| pred(n)).map(|n| n.id);
    let first = candidates.next()?;
    let others = candidates.count();
    if others > 0 {
        warn!(node = first, others, "several candidates for the {what} node");
    }
    Some(first)
}

/// Split a line into `key=value` pairs. Values may be double-quoted.
fn split_fields(line: &str, line_no: usize) -> Result<Vec<(&str, &str)>, LatticeError> {
    let mut fields = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(|| LatticeError::Parse {
            line: line_no,
            reason: format!("expected key=value, got `{rest}`"),
        })?;
        let key = &rest[..eq];
        let after = &rest[eq + 1..];
        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            let close = quoted.find('"').ok_or_else(|| LatticeError::Parse {
                line: line_no,
                reason: "unterminated quoted value".to_string(),
            })?;
            (&quoted[..close], &quoted[close + 1..])
        } else {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            (&after[..end], &after[end..])
        };
        fields.push((key, value));
        rest = remainder.trim_start();
    }
    Ok(fields)
}

/// Parse a node id and check it against the declared node count, or
/// `MAX_NODES` when there is none.
fn node_id(
    value: &str,
    key: &str,
    header: &Header,
    line_no: usize,
) -> Result<NodeId, LatticeError> {
    let id: NodeId = parse_num(value, key, line_no)?;
    let limit = header.num_nodes.unwrap_or(MAX_NODES);
    if id >= limit {
        return Err(LatticeError::Parse {
            line: line_no,
            reason: format!("node {id} out of range, the lattice has at most {limit} nodes"),
        });
    }
    Ok(id)
}

fn parse_num<T: std::str::FromStr>(
    value: &str,
    key: &str,
    line_no: usize,
) -> Result<T, LatticeError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| LatticeError::Parse {
        line: line_no,
        reason: format!("invalid value for {key}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const SIMPLE: &str = "\
VERSION=1.0
UTTERANCE=utt-1
lmscale=12.5
wdpenalty=-1.0
N=4 L=4
I=0 t=0.00
I=1 t=0.40
I=2 t=0.40
I=3 t=0.90
J=0 S=0 E=1 W=hello a=-100.0 l=-2.0
J=1 S=0 E=2 W=yellow a=-120.0 l=-3.0
J=2 S=1 E=3 W=!NULL a=0.0 l=0.0
J=3 S=2 E=3 W=!NULL
";

    #[test]
    fn parse_header_nodes_and_links() {
        let lattice = read_slf(Cursor::new(SIMPLE)).unwrap();
        assert_eq!(lattice.utterance_id.as_deref(), Some("utt-1"));
        assert_eq!(lattice.lm_scale, Some(12.5));
        assert_eq!(lattice.wi_penalty, Some(-1.0));
        assert_eq!(lattice.num_nodes(), 4);
        assert_eq!(lattice.num_links(), 4);
        assert_eq!(lattice.node(1).time, Some(0.4));

        let hello = lattice.link(0);
        assert_eq!(hello.word, "hello");
        assert_eq!((hello.start_node, hello.end_node), (0, 1));
        assert_eq!(hello.ac_logprob, Some(-100.0));
        assert_eq!(hello.lm_logprob, Some(-2.0));
        assert_eq!(lattice.link(3).ac_logprob, None);

        assert_eq!(lattice.initial_node().unwrap(), 0);
        assert_eq!(lattice.final_node().unwrap(), 3);
    }

    #[test]
    fn log_base_is_converted_to_natural_log() {
        let text = "base=10\nwdpenalty=-1\nI=0\nI=1\nJ=0 S=0 E=1 W=a a=-2 l=-1\n";
        let lattice = read_slf(Cursor::new(text)).unwrap();
        let ln10 = 10f64.ln();
        assert!((lattice.link(0).ac_logprob.unwrap() - -2.0 * ln10).abs() < 1e-12);
        assert!((lattice.link(0).lm_logprob.unwrap() - -ln10).abs() < 1e-12);
        assert!((lattice.wi_penalty.unwrap() - -ln10).abs() < 1e-12);
    }

    #[test]
    fn node_words_label_incoming_links() {
        let text = "I=0 W=!NULL\nI=1 W=dog\nJ=0 S=0 E=1\n";
        let lattice = read_slf(Cursor::new(text)).unwrap();
        assert_eq!(lattice.link(0).word, "dog");
    }

    #[test]
    fn explicit_start_and_end_override_inference() {
        let text = "start=1\nend=0\nI=0\nI=1\nJ=0 S=1 E=0 W=x\n";
        let lattice = read_slf(Cursor::new(text)).unwrap();
        assert_eq!(lattice.initial_node().unwrap(), 1);
        assert_eq!(lattice.final_node().unwrap(), 0);
    }

    #[test]
    fn quoted_values() {
        let fields = split_fields(r#"J=0 S=0 E=1 W="two words" a=-1"#, 1).unwrap();
        assert_eq!(fields[3], ("W", "two words"));
        assert_eq!(fields[4], ("a", "-1"));
    }

    #[test]
    fn bad_number_reports_line() {
        let err = read_slf(Cursor::new("I=0\nJ=0 S=0 E=x W=a\n")).unwrap_err();
        assert!(matches!(err, LatticeError::Parse { line: 2, .. }));
    }

    #[test]
    fn huge_node_ids_are_rejected() {
        let text = "I=0\nJ=0 S=0 E=18446744073709551615 W=a\n";
        let err = read_slf(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, LatticeError::Parse { line: 2, .. }));

        let err = read_slf(Cursor::new("I=99999999999\n")).unwrap_err();
        assert!(matches!(err, LatticeError::Parse { line: 1, .. }));
    }

    #[test]
    fn huge_node_count_is_rejected() {
        let err = read_slf(Cursor::new("N=18446744073709551615\nI=0\n")).unwrap_err();
        assert!(matches!(err, LatticeError::Parse { line: 1, .. }));
    }

    #[test]
    fn node_ids_must_fit_declared_count() {
        let err = read_slf(Cursor::new("N=2 L=1\nI=0\nI=1\nJ=0 S=0 E=2 W=a\n")).unwrap_err();
        assert!(matches!(err, LatticeError::Parse { line: 4, .. }));
    }

    #[test]
    fn file_name_is_fallback_utterance_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utt-7.slf");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"I=0\nI=1\nJ=0 S=0 E=1 W=a\n").unwrap();
        drop(file);
        let lattice = read_slf_file(&path).unwrap();
        assert_eq!(lattice.utterance_id.as_deref(), Some("utt-7.slf"));
    }
}
