//! The canonical stanza/symbol text format (spec §4.7).
//!
//! A stanza is a blank-line-terminated block of `symbol value...` lines.
//! The tokenizer below is the three-state machine spec §9 calls for
//! (beginning-of-line, reading-symbol, reading-value), applied one line at a
//! time; blank lines are the stanza separator. Every [`VertreeError::Serialization`]
//! carries a 1-based line and 0-based column.

use std::collections::{BTreeMap, BTreeSet};

use crate::attr::{AttrKey, AttrValue};
use crate::cset::ChangeSet;
use crate::error::{Result, VertreeError};
use crate::hash::{ContentHash, FileId, RevisionId};
use crate::marking::{Marking, MarkingMap};
use crate::node::{Node, PermanentNodeIdSource};
use crate::path::FilePath;
use crate::roster::Roster;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    Hex(ContentHash),
    Sym(String),
}

fn serr(line: usize, column: usize, expected: &str) -> VertreeError {
    VertreeError::Serialization {
        line,
        column,
        expected: expected.to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Tokenizes one line into `(symbol, values)`. `line_no` is 1-based for
/// error reporting; columns are 0-based.
fn parse_line(line: &str, line_no: usize) -> Result<(String, Vec<Value>)> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    if i >= chars.len() || !chars[i].is_ascii_alphabetic() {
        return Err(serr(line_no, i, "symbol"));
    }
    let sym_start = i;
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    let symbol: String = chars[sym_start..i].iter().collect();

    let mut values = Vec::new();
    while i < chars.len() {
        if chars[i] != ' ' {
            return Err(serr(line_no, i, "space before value"));
        }
        i += 1;
        if i >= chars.len() {
            return Err(serr(line_no, i, "value"));
        }
        match chars[i] {
            '"' => {
                i += 1;
                let mut s = String::new();
                loop {
                    if i >= chars.len() {
                        return Err(serr(line_no, i, "closing quote"));
                    }
                    match chars[i] {
                        '"' => {
                            i += 1;
                            break;
                        }
                        '\\' => {
                            i += 1;
                            if i >= chars.len() {
                                return Err(serr(line_no, i, "escape sequence"));
                            }
                            match chars[i] {
                                '"' => s.push('"'),
                                '\\' => s.push('\\'),
                                'n' => s.push('\n'),
                                _ => return Err(serr(line_no, i, "'\"', '\\\\' or 'n'")),
                            }
                            i += 1;
                        }
                        c => {
                            s.push(c);
                            i += 1;
                        }
                    }
                }
                values.push(Value::Str(s));
            }
            '[' => {
                i += 1;
                let hex_start = i;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(serr(line_no, i, "closing ']'"));
                }
                let hex: String = chars[hex_start..i].iter().collect();
                let h = ContentHash::from_hex(&hex).ok_or_else(|| serr(line_no, hex_start, "40 hex digits"))?;
                i += 1;
                values.push(Value::Hex(h));
            }
            c if c.is_ascii_alphabetic() => {
                let sym_start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                values.push(Value::Sym(chars[sym_start..i].iter().collect()));
            }
            _ => return Err(serr(line_no, i, "'\"', '[' or a symbol")),
        }
    }
    Ok((symbol, values))
}

fn write_attrs(out: &mut String, node: &Node) {
    for (key, (live, value)) in node.attrs() {
        if *live {
            out.push_str(&format!("attr \"{}\" \"{}\"\n", escape(&key.0), escape(&value.0)));
        } else {
            out.push_str(&format!("dormant_attr \"{}\"\n", escape(&key.0)));
        }
    }
}

fn write_marking(out: &mut String, m: &Marking) {
    out.push_str(&format!("birth [{}]\n", m.birth_revision));
    for r in &m.parent_name {
        out.push_str(&format!("parent_name_mark [{r}]\n"));
    }
    for r in &m.file_content {
        out.push_str(&format!("file_content_mark [{r}]\n"));
    }
    for (key, marks) in &m.attrs {
        for r in marks {
            out.push_str(&format!("attr_mark \"{}\" [{r}]\n", escape(&key.0)));
        }
    }
}

/// Writes `roster`'s canonical text. When `markings` is `Some`, marking
/// lines are interleaved per node (`print_local_parts = true` in spec
/// terms); the manifest hash is always computed with `markings = None`.
pub fn write_canonical_roster(roster: &Roster, markings: Option<&MarkingMap>) -> Result<String> {
    let mut out = String::new();
    out.push_str("format_version \"1\"\n\n");

    let mut ordered: Vec<(FilePath, crate::node::NodeId)> = vec![(FilePath::root(), roster.root_id())];
    ordered.extend(roster.collect_path_ids()?);

    for (path, id) in ordered {
        let node = roster.get_node_by_id(id)?;
        match node {
            Node::Dir(_) => out.push_str(&format!("dir \"{}\"\n", escape(&path.join()))),
            Node::File(f) => {
                out.push_str(&format!("file \"{}\"\n", escape(&path.join())));
                out.push_str(&format!("content [{}]\n", f.content));
            }
        }
        write_attrs(&mut out, node);
        if let Some(marks) = markings {
            if let Some(m) = marks.get(id) {
                write_marking(&mut out, m);
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Parses text written by [`write_canonical_roster`]. Node ids are not part
/// of the canonical form (only paths are); a fresh [`PermanentNodeIdSource`]
/// allocates ids for the reconstructed roster, so node identity is not
/// preserved across a write/parse round trip, only structure, content,
/// attrs, and (if present) markings.
pub fn parse_roster(text: &str, with_markings: bool) -> Result<(Roster, Option<MarkingMap>)> {
    let stanzas: Vec<&str> = text.split("\n\n").filter(|s| !s.trim().is_empty()).collect();
    let mut iter = stanzas.into_iter();

    let header = iter.next().ok_or_else(|| serr(1, 0, "format_version stanza"))?;
    let header_line = header.lines().next().unwrap_or("");
    let (sym, vals) = parse_line(header_line, 1)?;
    if sym != "format_version" {
        return Err(serr(1, 0, "format_version"));
    }
    match vals.as_slice() {
        [Value::Str(v)] if v == "1" => {}
        _ => return Err(serr(1, 15, "\"1\"")),
    }

    let mut roster = Roster::empty();
    let mut nis = PermanentNodeIdSource::default();
    let mut markings = if with_markings { Some(MarkingMap::new()) } else { None };
    let mut line_no = header.lines().count() + 2;

    for stanza in iter {
        let mut lines = stanza.lines();
        let first = lines.next().ok_or_else(|| serr(line_no, 0, "dir or file"))?;
        let (sym, vals) = parse_line(first, line_no)?;
        let path_str = match vals.as_slice() {
            [Value::Str(p)] => p.clone(),
            _ => return Err(serr(line_no, 0, "quoted path")),
        };
        let path = FilePath::split(&path_str)?;
        let mut inner_line = line_no + 1;

        let id = if path.is_root() {
            roster.root_id()
        } else if sym == "dir" {
            let id = roster.create_dir_node(&mut nis);
            roster.attach_node_at(id, &path)?;
            id
        } else if sym == "file" {
            let content_line = lines.next().ok_or_else(|| serr(inner_line, 0, "content"))?;
            let (csym, cvals) = parse_line(content_line, inner_line)?;
            if csym != "content" {
                return Err(serr(inner_line, 0, "content"));
            }
            let content = match cvals.as_slice() {
                [Value::Hex(h)] => FileId::from(*h),
                _ => return Err(serr(inner_line, 0, "hex content")),
            };
            inner_line += 1;
            let id = roster.create_file_node(content, &mut nis);
            roster.attach_node_at(id, &path)?;
            id
        } else {
            return Err(serr(line_no, 0, "dir or file"));
        };

        let mut birth = None;
        let mut parent_name = BTreeSet::new();
        let mut file_content = BTreeSet::new();
        let mut attrs: BTreeMap<AttrKey, BTreeSet<RevisionId>> = BTreeMap::new();

        for line in lines {
            let (sym, vals) = parse_line(line, inner_line)?;
            match sym.as_str() {
                "attr" => match vals.as_slice() {
                    [Value::Str(k), Value::Str(v)] => {
                        roster.set_attr(&path, AttrKey(k.clone()), AttrValue(v.clone()))?;
                    }
                    _ => return Err(serr(inner_line, 0, "attr key and value")),
                },
                "dormant_attr" => match vals.as_slice() {
                    [Value::Str(k)] => roster.clear_attr(&path, &AttrKey(k.clone()))?,
                    _ => return Err(serr(inner_line, 0, "dormant_attr key")),
                },
                "birth" => match vals.as_slice() {
                    [Value::Hex(h)] => birth = Some(RevisionId::from(*h)),
                    _ => return Err(serr(inner_line, 0, "birth hex")),
                },
                "parent_name_mark" => match vals.as_slice() {
                    [Value::Hex(h)] => {
                        parent_name.insert(RevisionId::from(*h));
                    }
                    _ => return Err(serr(inner_line, 0, "hex")),
                },
                "file_content_mark" => match vals.as_slice() {
                    [Value::Hex(h)] => {
                        file_content.insert(RevisionId::from(*h));
                    }
                    _ => return Err(serr(inner_line, 0, "hex")),
                },
                "attr_mark" => match vals.as_slice() {
                    [Value::Str(k), Value::Hex(h)] => {
                        attrs.entry(AttrKey(k.clone())).or_default().insert(RevisionId::from(*h));
                    }
                    _ => return Err(serr(inner_line, 0, "attr_mark key and hex")),
                },
                _ => return Err(serr(inner_line, 0, "known stanza symbol")),
            }
            inner_line += 1;
        }

        if let Some(marks) = markings.as_mut() {
            let birth = birth.ok_or_else(|| serr(inner_line, 0, "birth"))?;
            marks.put(
                id,
                Marking {
                    birth_revision: birth,
                    parent_name,
                    file_content,
                    attrs,
                },
            );
        }

        line_no += stanza.lines().count() + 1;
    }

    roster.check_sane()?;
    Ok((roster, markings))
}

/// Writes `cs`'s canonical text: the seven sections in fixed order, one
/// stanza per entry.
pub fn write_canonical_cset(cs: &ChangeSet) -> String {
    let mut out = String::new();
    for path in &cs.nodes_deleted {
        out.push_str(&format!("delete \"{}\"\n\n", escape(&path.join())));
    }
    for (src, dst) in &cs.nodes_renamed {
        out.push_str(&format!(
            "rename \"{}\" \"{}\"\n\n",
            escape(&src.join()),
            escape(&dst.join())
        ));
    }
    for path in &cs.dirs_added {
        out.push_str(&format!("add_dir \"{}\"\n\n", escape(&path.join())));
    }
    for (path, fid) in &cs.files_added {
        out.push_str(&format!("add_file \"{}\"\ncontent [{}]\n\n", escape(&path.join()), fid));
    }
    for (path, (old, new)) in &cs.deltas_applied {
        out.push_str(&format!(
            "patch \"{}\"\nfrom [{}]\nto [{}]\n\n",
            escape(&path.join()),
            old,
            new
        ));
    }
    for (path, key) in &cs.attrs_cleared {
        out.push_str(&format!("clear \"{}\" \"{}\"\n\n", escape(&path.join()), escape(&key.0)));
    }
    for ((path, key), value) in &cs.attrs_set {
        out.push_str(&format!(
            "set \"{}\" \"{}\" \"{}\"\n\n",
            escape(&path.join()),
            escape(&key.0),
            escape(&value.0)
        ));
    }
    out
}

/// Parses one cset-entry stanza (the unit `parse_cset` and `parse_revision`
/// both iterate over) into `cs`.
fn parse_cset_stanza(cs: &mut ChangeSet, stanza: &str, line_no: usize) -> Result<()> {
    let first = stanza.lines().next().ok_or_else(|| serr(line_no, 0, "cset entry"))?;
    let (sym, vals) = parse_line(first, line_no)?;
    match sym.as_str() {
        "delete" => match vals.as_slice() {
            [Value::Str(p)] => {
                cs.nodes_deleted.insert(FilePath::split(p)?);
            }
            _ => return Err(serr(line_no, 0, "delete path")),
        },
        "rename" => match vals.as_slice() {
            [Value::Str(src), Value::Str(dst)] => {
                cs.nodes_renamed.insert(FilePath::split(src)?, FilePath::split(dst)?);
            }
            _ => return Err(serr(line_no, 0, "rename src dst")),
        },
        "add_dir" => match vals.as_slice() {
            [Value::Str(p)] => {
                cs.dirs_added.insert(FilePath::split(p)?);
            }
            _ => return Err(serr(line_no, 0, "add_dir path")),
        },
        "add_file" => {
            let path = match vals.as_slice() {
                [Value::Str(p)] => FilePath::split(p)?,
                _ => return Err(serr(line_no, 0, "add_file path")),
            };
            let content_line = stanza.lines().nth(1).ok_or_else(|| serr(line_no + 1, 0, "content"))?;
            let (csym, cvals) = parse_line(content_line, line_no + 1)?;
            if csym != "content" {
                return Err(serr(line_no + 1, 0, "content"));
            }
            match cvals.as_slice() {
                [Value::Hex(h)] => {
                    cs.files_added.insert(path, FileId::from(*h));
                }
                _ => return Err(serr(line_no + 1, 0, "hex content")),
            }
        }
        "patch" => {
            let path = match vals.as_slice() {
                [Value::Str(p)] => FilePath::split(p)?,
                _ => return Err(serr(line_no, 0, "patch path")),
            };
            let mut lines = stanza.lines().skip(1);
            let from_line = lines.next().ok_or_else(|| serr(line_no + 1, 0, "from"))?;
            let to_line = lines.next().ok_or_else(|| serr(line_no + 2, 0, "to"))?;
            let (fsym, fvals) = parse_line(from_line, line_no + 1)?;
            let (tsym, tvals) = parse_line(to_line, line_no + 2)?;
            if fsym != "from" || tsym != "to" {
                return Err(serr(line_no + 1, 0, "from/to"));
            }
            let old = match fvals.as_slice() {
                [Value::Hex(h)] => *h,
                _ => return Err(serr(line_no + 1, 0, "hex")),
            };
            let new = match tvals.as_slice() {
                [Value::Hex(h)] => *h,
                _ => return Err(serr(line_no + 2, 0, "hex")),
            };
            cs.deltas_applied.insert(path, (FileId::from(old), FileId::from(new)));
        }
        "clear" => match vals.as_slice() {
            [Value::Str(p), Value::Str(k)] => {
                cs.attrs_cleared.insert((FilePath::split(p)?, AttrKey(k.clone())));
            }
            _ => return Err(serr(line_no, 0, "clear path key")),
        },
        "set" => match vals.as_slice() {
            [Value::Str(p), Value::Str(k), Value::Str(v)] => {
                cs.attrs_set
                    .insert((FilePath::split(p)?, AttrKey(k.clone())), AttrValue(v.clone()));
            }
            _ => return Err(serr(line_no, 0, "set path key value")),
        },
        _ => return Err(serr(line_no, 0, "known cset entry kind")),
    }
    Ok(())
}

/// Parses text written by [`write_canonical_cset`]. Does not re-run
/// [`ChangeSet::validate`]; callers apply that through [`crate::cset::apply_cset`].
pub fn parse_cset(text: &str) -> Result<ChangeSet> {
    let mut cs = ChangeSet::default();
    let stanzas: Vec<&str> = text.split("\n\n").filter(|s| !s.trim().is_empty()).collect();
    let mut line_no = 1;

    for stanza in stanzas {
        parse_cset_stanza(&mut cs, stanza, line_no)?;
        line_no += stanza.lines().count() + 1;
    }
    Ok(cs)
}

/// Writes `rev`'s canonical text (spec §4.7): a header, the new manifest
/// hash, then one `old_revision` stanza per edge followed by that edge's
/// cset stanzas, edges in ascending parent-revision-id order (guaranteed by
/// [`crate::revision::Revision::edges`] being a `BTreeMap`).
pub fn write_canonical_revision(rev: &crate::revision::Revision) -> String {
    let mut out = String::new();
    out.push_str("format_version \"1\"\n\n");
    out.push_str(&format!("new_manifest [{}]\n\n", rev.new_manifest));
    for (parent, cs) in &rev.edges {
        out.push_str(&format!("old_revision [{parent}]\n\n"));
        out.push_str(&write_canonical_cset(cs));
    }
    out
}

/// Parses text written by [`write_canonical_revision`].
pub fn parse_revision(text: &str) -> Result<crate::revision::Revision> {
    use crate::hash::ManifestId;

    let stanzas: Vec<&str> = text.split("\n\n").filter(|s| !s.trim().is_empty()).collect();
    let mut iter = stanzas.into_iter();
    let mut line_no = 1;

    let header = iter.next().ok_or_else(|| serr(1, 0, "format_version stanza"))?;
    let (sym, vals) = parse_line(header.lines().next().unwrap_or(""), 1)?;
    if sym != "format_version" {
        return Err(serr(1, 0, "format_version"));
    }
    match vals.as_slice() {
        [Value::Str(v)] if v == "1" => {}
        _ => return Err(serr(1, 15, "\"1\"")),
    }
    line_no += header.lines().count() + 1;

    let manifest_stanza = iter.next().ok_or_else(|| serr(line_no, 0, "new_manifest stanza"))?;
    let (sym, vals) = parse_line(
        manifest_stanza.lines().next().unwrap_or(""),
        line_no,
    )?;
    if sym != "new_manifest" {
        return Err(serr(line_no, 0, "new_manifest"));
    }
    let new_manifest = match vals.as_slice() {
        [Value::Hex(h)] => ManifestId::from(*h),
        _ => return Err(serr(line_no, 0, "hex manifest id")),
    };
    line_no += manifest_stanza.lines().count() + 1;

    let mut edges = BTreeMap::new();
    let mut current_parent: Option<RevisionId> = None;
    let mut current_cset = ChangeSet::default();

    for stanza in iter {
        let first = stanza.lines().next().ok_or_else(|| serr(line_no, 0, "stanza"))?;
        let (sym, vals) = parse_line(first, line_no)?;
        if sym == "old_revision" {
            if let Some(parent) = current_parent.take() {
                edges.insert(parent, std::mem::take(&mut current_cset));
            }
            current_parent = Some(match vals.as_slice() {
                [Value::Hex(h)] => RevisionId::from(*h),
                _ => return Err(serr(line_no, 0, "hex revision id")),
            });
        } else {
            if current_parent.is_none() {
                return Err(serr(line_no, 0, "old_revision before cset entries"));
            }
            parse_cset_stanza(&mut current_cset, stanza, line_no)?;
        }
        line_no += stanza.lines().count() + 1;
    }
    if let Some(parent) = current_parent {
        edges.insert(parent, current_cset);
    }

    Ok(crate::revision::Revision { new_manifest, edges })
}
