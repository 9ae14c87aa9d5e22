//! Class-id to label-name mapping.
//!
//! Ultralytics ONNX exports store the class names as a Python dict literal in
//! the `names` custom metadata entry, e.g. `{0: 'bibimbap', 1: "kimchi's"}`.

use crate::errors::InferenceError;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

/// Resolves class ids produced by a detector to display labels.
pub trait LabelMap: Send + Sync {
    fn label(&self, class_id: usize) -> Option<&str>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label for `class_id`, or the id itself when the model has no name for it.
    fn resolve(&self, class_id: usize) -> String {
        self.label(class_id)
            .map(str::to_owned)
            .unwrap_or_else(|| class_id.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
    names: BTreeMap<usize, String>,
}

impl ClassNames {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(id, name)| (id, name.into()))
                .collect(),
        }
    }

    /// Parse the `names` metadata entry written by the Ultralytics exporter.
    pub fn parse_metadata(raw: &str) -> Result<Self, InferenceError> {
        let body = raw
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| {
                InferenceError::InvalidLabels(format!("expected an {{id: name}} mapping, got {raw:?}"))
            })?;

        let mut names = BTreeMap::new();
        let mut chars = body.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let id = parse_id(&mut chars)?;
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.next() != Some(':') {
                return Err(InferenceError::InvalidLabels(format!(
                    "missing ':' after class id {id}"
                )));
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            let name = parse_quoted(&mut chars, id)?;
            names.insert(id, name);
        }

        Ok(Self { names })
    }

    /// Read a labels file with one class name per non-blank line.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let contents = std::fs::read_to_string(path)?;
        let names = Self::from_names(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        );
        if names.is_empty() {
            return Err(InferenceError::MissingLabels);
        }
        Ok(names)
    }
}

impl LabelMap for ClassNames {
    fn label(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

fn parse_id(chars: &mut Peekable<Chars>) -> Result<usize, InferenceError> {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits.parse().map_err(|_| {
        let rest: String = chars.clone().take(16).collect();
        InferenceError::InvalidLabels(format!("expected a class id near {rest:?}"))
    })
}

fn parse_quoted(chars: &mut Peekable<Chars>, id: usize) -> Result<String, InferenceError> {
    let quote = match chars.next() {
        Some(q @ ('\'' | '"')) => q,
        _ => {
            return Err(InferenceError::InvalidLabels(format!(
                "class {id} has no quoted name"
            )));
        }
    };

    let mut name = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => name.push('\n'),
                Some('t') => name.push('\t'),
                Some(escaped) => name.push(escaped),
                None => break,
            },
            c if c == quote => return Ok(name),
            c => name.push(c),
        }
    }

    Err(InferenceError::InvalidLabels(format!(
        "unterminated name for class {id}"
    )))
}

/// Parse the `imgsz` metadata entry (`[640, 640]`) into `(height, width)`.
pub fn parse_imgsz(raw: &str) -> Option<(u32, u32)> {
    let mut dims = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|d| d.trim().parse::<u32>());

    match (dims.next(), dims.next()) {
        (Some(Ok(h)), Some(Ok(w))) => Some((h, w)),
        (Some(Ok(side)), None) => Some((side, side)),
        _ => None,
    }
}
