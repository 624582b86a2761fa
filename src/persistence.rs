// File: src/persistence.rs
use crate::config::MinerConfig;
use crate::core::engine::AcromineMiner;
use crate::core::trie::{CandidateTrie, ROOT};
use crate::core::types::{NodeId, PassState, TokenTuple};
use crate::error::{MinerError, Result};
use crate::stemmer::WatchfulStemmer;
use serde::de::{Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

// --- JSON dump format -------------------------------------------------------

#[derive(Serialize)]
struct PersistedNode<'a> {
    longform: &'a [String],
    count: u64,
    score: f64,
    sum_ft: f64,
    sum_ft2: f64,
    children: BTreeMap<&'a str, PersistedNode<'a>>,
}

#[derive(Serialize)]
struct PersistedMiner<'a> {
    shortform: &'a str,
    window: usize,
    internal_trie: BTreeMap<&'a str, PersistedNode<'a>>,
    longforms: BTreeMap<String, f64>,
    stemmer: &'a WatchfulStemmer,
}

fn persisted_children(trie: &CandidateTrie, id: NodeId) -> BTreeMap<&str, PersistedNode<'_>> {
    trie.node(id)
        .children()
        .map(|(token, child)| {
            let node = trie.node(child);
            (
                token.as_str(),
                PersistedNode {
                    longform: &node.longform,
                    count: node.count,
                    score: node.score,
                    sum_ft: node.sum_ft,
                    sum_ft2: node.sum_ft2,
                    children: persisted_children(trie, child),
                },
            )
        })
        .collect()
}

fn persisted(miner: &AcromineMiner) -> PersistedMiner<'_> {
    PersistedMiner {
        shortform: &miner.shortform,
        window: miner.window,
        internal_trie: persisted_children(&miner.trie, ROOT),
        longforms: miner
            .longforms
            .iter()
            .map(|(tokens, &score)| (render_tuple_key(tokens), score))
            .collect(),
        stemmer: &miner.stemmer,
    }
}

/// Parsed JSON that keeps object entries in document order, duplicates
/// included, so that repeated keys can be reported instead of silently
/// collapsed.
enum Json {
    Null,
    Bool,
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    String(String),
    Array(Vec<Json>),
    Object(Vec<(String, Json)>),
}

impl Json {
    fn kind(&self) -> &'static str {
        match self {
            Json::Null => "null",
            Json::Bool => "a boolean",
            Json::Unsigned(_) | Json::Signed(_) | Json::Float(_) => "a number",
            Json::String(_) => "a string",
            Json::Array(_) => "an array",
            Json::Object(_) => "an object",
        }
    }
}

impl<'de> Deserialize<'de> for Json {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct JsonVisitor;

        impl<'de> Visitor<'de> for JsonVisitor {
            type Value = Json;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_unit<E>(self) -> std::result::Result<Json, E> {
                Ok(Json::Null)
            }

            fn visit_none<E>(self) -> std::result::Result<Json, E> {
                Ok(Json::Null)
            }

            fn visit_some<D>(self, deserializer: D) -> std::result::Result<Json, D::Error>
            where
                D: Deserializer<'de>,
            {
                Json::deserialize(deserializer)
            }

            fn visit_bool<E>(self, _: bool) -> std::result::Result<Json, E> {
                Ok(Json::Bool)
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Json, E> {
                Ok(Json::Unsigned(v))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Json, E> {
                Ok(Json::Signed(v))
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Json, E> {
                Ok(Json::Float(v))
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Json, E> {
                Ok(Json::String(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> std::result::Result<Json, E> {
                Ok(Json::String(v))
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Json, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Json::Array(items))
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Json, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Json>()? {
                    entries.push(entry);
                }
                Ok(Json::Object(entries))
            }
        }

        deserializer.deserialize_any(JsonVisitor)
    }
}

/// Parses a whole document without a nesting limit. Every trie level adds
/// two levels of nesting, so deep tries exceed serde_json's default limit;
/// the stack grows on demand instead.
fn parse_document<'de, R>(mut de: serde_json::Deserializer<R>) -> Result<Json>
where
    R: serde_json::de::Read<'de>,
{
    de.disable_recursion_limit();
    let document = Json::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(document)
}

type Fields = [(String, Json)];

fn missing(path: &str, field: &str) -> MinerError {
    MinerError::load(path, format!("missing field `{field}`"))
}

fn wrong_type(path: &str, field: &str, expected: &str, found: &Json) -> MinerError {
    MinerError::load(
        path,
        format!("field `{field}` should be {expected}, found {}", found.kind()),
    )
}

fn field<'a>(fields: &'a Fields, path: &str, name: &str) -> Result<&'a Json> {
    let mut values = fields.iter().filter(|(key, _)| key == name).map(|(_, v)| v);
    let value = values.next().ok_or_else(|| missing(path, name))?;
    if values.next().is_some() {
        return Err(MinerError::load(path, format!("duplicate field `{name}`")));
    }
    Ok(value)
}

fn object_field<'a>(fields: &'a Fields, path: &str, name: &str) -> Result<&'a Fields> {
    match field(fields, path, name)? {
        Json::Object(entries) => Ok(entries),
        other => Err(wrong_type(path, name, "an object", other)),
    }
}

fn u64_field(fields: &Fields, path: &str, name: &str) -> Result<u64> {
    match field(fields, path, name)? {
        Json::Unsigned(n) => Ok(*n),
        other => Err(wrong_type(path, name, "a non-negative integer", other)),
    }
}

fn as_f64(value: &Json) -> Option<f64> {
    match *value {
        Json::Unsigned(n) => Some(n as f64),
        Json::Signed(n) => Some(n as f64),
        Json::Float(x) => Some(x),
        _ => None,
    }
}

fn f64_field(fields: &Fields, path: &str, name: &str) -> Result<f64> {
    let value = field(fields, path, name)?;
    as_f64(value).ok_or_else(|| wrong_type(path, name, "a number", value))
}

fn tokens_field(fields: &Fields, path: &str, name: &str) -> Result<Vec<String>> {
    let value = field(fields, path, name)?;
    let Json::Array(items) = value else {
        return Err(wrong_type(path, name, "an array of strings", value));
    };
    items
        .iter()
        .map(|item| match item {
            Json::String(token) => Ok(token.clone()),
            other => Err(wrong_type(path, name, "an array of strings", other)),
        })
        .collect()
}

/// Rebuilds the trie breadth-first from the persisted `internal_trie`
/// object, checking every node before it is attached.
fn restore_trie(trie: &mut CandidateTrie, top: &Fields) -> Result<()> {
    let root_children = object_field(top, "internal_trie", "internal_trie")?;
    let mut pending = VecDeque::from([(ROOT, "internal_trie".to_string(), root_children)]);
    while let Some((parent, path, children)) = pending.pop_front() {
        let mut seen = HashSet::with_capacity(children.len());
        for (token, body) in children {
            let node_path = format!("{path}/{token}");
            if !seen.insert(token.as_str()) {
                return Err(MinerError::load(node_path, "duplicate child token"));
            }
            let Json::Object(fields) = body else {
                return Err(MinerError::load(
                    node_path,
                    format!("node should be an object, found {}", body.kind()),
                ));
            };
            let longform = tokens_field(fields, &node_path, "longform")?;
            let count = u64_field(fields, &node_path, "count")?;
            let score = f64_field(fields, &node_path, "score")?;
            let sum_ft = f64_field(fields, &node_path, "sum_ft")?;
            let sum_ft2 = f64_field(fields, &node_path, "sum_ft2")?;
            let grandchildren = object_field(fields, &node_path, "children")?;

            let parent_longform = &trie.node(parent).longform;
            let extends = longform.len() == parent_longform.len() + 1
                && longform.starts_with(parent_longform)
                && longform.last() == Some(token);
            if !extends {
                return Err(MinerError::load(
                    node_path,
                    "longform does not extend its parent by its key",
                ));
            }
            if count == 0 {
                return Err(MinerError::load(node_path, "count must be positive"));
            }

            let id = trie.attach_restored(parent, token, count, score, sum_ft, sum_ft2);
            pending.push_back((id, node_path, grandchildren));
        }
    }
    Ok(())
}

fn restore_longforms(top: &Fields) -> Result<HashMap<TokenTuple, f64>> {
    let entries = object_field(top, "longforms", "longforms")?;
    let mut longforms = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        let path = format!("longforms/{key}");
        let tokens = parse_tuple_key(key)
            .ok_or_else(|| MinerError::load(path.as_str(), "key is not a token tuple"))?;
        let score = as_f64(value).ok_or_else(|| {
            let reason = format!("score should be a number, found {}", value.kind());
            MinerError::load(path.as_str(), reason)
        })?;
        if longforms.insert(tokens, score).is_some() {
            return Err(MinerError::load(path, "duplicate candidate"));
        }
    }
    Ok(longforms)
}

fn restore_stemmer(top: &Fields) -> Result<WatchfulStemmer> {
    let stemmer = object_field(top, "stemmer", "stemmer")?;
    let mut counts = BTreeMap::new();
    for (stem, words) in object_field(stemmer, "stemmer", "counts")? {
        let path = format!("stemmer/counts/{stem}");
        let Json::Object(words) = words else {
            let reason = format!("expected an object, found {}", words.kind());
            return Err(MinerError::load(path, reason));
        };
        let mut surface = BTreeMap::new();
        for (word, count) in words {
            match count {
                Json::Unsigned(n) => {
                    surface.insert(word.clone(), *n);
                }
                other => {
                    let reason =
                        format!("count should be a non-negative integer, found {}", other.kind());
                    return Err(MinerError::load(format!("{path}/{word}"), reason));
                }
            }
        }
        counts.insert(stem.clone(), surface);
    }
    Ok(WatchfulStemmer::from_counts(counts))
}

fn check_window(window: usize) -> Result<()> {
    MinerConfig::default()
        .with_window(window)
        .validate()
        .map_err(|err| MinerError::load("window", err.to_string()))
}

fn restore(document: Json) -> Result<AcromineMiner> {
    let Json::Object(top) = &document else {
        return Err(MinerError::load(
            "document",
            format!("expected an object, found {}", document.kind()),
        ));
    };
    let shortform = match field(top, "shortform", "shortform")? {
        Json::String(s) if !s.is_empty() => s.clone(),
        Json::String(_) => return Err(MinerError::load("shortform", "shortform is empty")),
        other => return Err(wrong_type("shortform", "shortform", "a string", other)),
    };
    let window = usize::try_from(u64_field(top, "window", "window")?)
        .map_err(|_| MinerError::load("window", "window does not fit in memory"))?;
    check_window(window)?;

    let mut trie = CandidateTrie::new(shortform.chars().count());
    restore_trie(&mut trie, top)?;
    let longforms = restore_longforms(top)?;
    let stemmer = restore_stemmer(top)?;

    Ok(AcromineMiner {
        shortform,
        window,
        trie,
        longforms,
        stemmer,
        state: PassState::Dirty,
    })
}

/// Writes the miner as JSON.
pub fn dump<W: Write>(miner: &AcromineMiner, writer: W) -> Result<()> {
    serde_json::to_writer(writer, &persisted(miner))?;
    Ok(())
}

pub fn dumps(miner: &AcromineMiner) -> Result<String> {
    Ok(serde_json::to_string(&persisted(miner))?)
}

/// Reads a miner from JSON. Nothing is returned unless the whole document
/// is well formed; problems inside it are reported with their path.
pub fn load<R: Read>(reader: R) -> Result<AcromineMiner> {
    restore(parse_document(serde_json::Deserializer::from_reader(reader))?)
}

pub fn loads(json: &str) -> Result<AcromineMiner> {
    restore(parse_document(serde_json::Deserializer::from_str(json))?)
}

// --- Candidate map keys -----------------------------------------------------

fn quote_token(token: &str) -> String {
    let quote = if token.contains('\'') && !token.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(token.len() + 2);
    out.push(quote);
    for c in token.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Renders tokens as a tuple literal, e.g. `('endoplasm', 'reticulum')` or
/// `('reticulum',)`.
pub fn render_tuple_key(tokens: &[String]) -> String {
    let parts: Vec<String> = tokens.iter().map(|t| quote_token(t)).collect();
    match parts.as_slice() {
        [] => "()".to_string(),
        [only] => format!("({only},)"),
        _ => format!("({})", parts.join(", ")),
    }
}

/// Inverse of [`render_tuple_key`]. Accepts either quote style.
pub fn parse_tuple_key(key: &str) -> Option<TokenTuple> {
    let mut chars = key.trim().chars().peekable();
    if chars.next()? != '(' {
        return None;
    }
    let mut tokens = Vec::new();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next()? {
            ')' => break,
            quote @ ('\'' | '"') => {
                let mut token = String::new();
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            'n' => token.push('\n'),
                            't' => token.push('\t'),
                            other => token.push(other),
                        },
                        c if c == quote => break,
                        c => token.push(c),
                    }
                }
                tokens.push(token);
                while chars.next_if(|c| c.is_whitespace()).is_some() {}
                match chars.next()? {
                    ',' => continue,
                    ')' => break,
                    _ => return None,
                }
            }
            _ => return None,
        }
    }
    if chars.next().is_some() {
        return None;
    }
    // A lone token needs its trailing comma to be a tuple.
    if tokens.len() == 1 && !key.trim_end().trim_end_matches(')').trim_end().ends_with(',') {
        return None;
    }
    Some(tokens)
}

// --- Files -------------------------------------------------------------------

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&NamedTempFile>) -> Result<()>,
{
    let parent_dir = parent_dir(path);
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    let mut writer = BufWriter::new(&temp_file);
    write(&mut writer)?;
    writer.flush()?;
    drop(writer);

    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically writes the JSON dump to `path`.
pub fn save_to_disk(miner: &AcromineMiner, path: &Path) -> Result<()> {
    write_atomically(path, |writer| dump(miner, writer))?;
    info!(path = %path.display(), candidates = miner.trie.len(), "saved miner");
    Ok(())
}

pub fn load_from_disk(path: &Path) -> Result<AcromineMiner> {
    let file = File::open(path)?;
    let miner = load(BufReader::new(file))?;
    debug!(path = %path.display(), candidates = miner.trie.len(), "loaded miner");
    Ok(miner)
}

// --- Binary snapshots ----------------------------------------------------------

#[derive(Serialize)]
struct SnapshotRef<'a> {
    shortform: &'a str,
    window: usize,
    trie: &'a CandidateTrie,
    longforms: &'a HashMap<TokenTuple, f64>,
    stemmer: &'a WatchfulStemmer,
}

#[derive(Deserialize)]
struct Snapshot {
    shortform: String,
    window: usize,
    trie: CandidateTrie,
    longforms: HashMap<TokenTuple, f64>,
    stemmer: WatchfulStemmer,
}

/// Atomically writes a compact binary snapshot of the whole miner,
/// alignment state included.
pub fn save_snapshot(miner: &AcromineMiner, path: &Path) -> Result<()> {
    let state = SnapshotRef {
        shortform: &miner.shortform,
        window: miner.window,
        trie: &miner.trie,
        longforms: &miner.longforms,
        stemmer: &miner.stemmer,
    };
    write_atomically(path, |writer| {
        bincode::serialize_into(writer, &state)?;
        Ok(())
    })?;
    info!(path = %path.display(), candidates = miner.trie.len(), "saved snapshot");
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<AcromineMiner> {
    let file = File::open(path)?;
    let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))?;
    if snapshot.shortform.is_empty() {
        return Err(MinerError::load("shortform", "shortform is empty"));
    }
    check_window(snapshot.window)?;
    snapshot.trie.validate_structure()?;
    debug!(path = %path.display(), candidates = snapshot.trie.len(), "loaded snapshot");
    Ok(AcromineMiner {
        shortform: snapshot.shortform,
        window: snapshot.window,
        trie: snapshot.trie,
        longforms: snapshot.longforms,
        stemmer: snapshot.stemmer,
        state: PassState::Dirty,
    })
}
