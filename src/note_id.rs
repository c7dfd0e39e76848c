/// Identifier assigned to a note on its first save.
///
/// The full form is a hyphenated UUID v4. Humans refer to notes by a short
/// hex prefix (`#a1b2c3`), which [`NoteId::resolve`] expands against the
/// known ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NoteId(String);

const SHORT_LEN: usize = 6;

impl NoteId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The first six hex characters of the id.
    pub fn short(&self) -> &str {
        short_of(&self.0)
    }

    /// Find the single id in `known` matching `reference`.
    ///
    /// `reference` is either a full id or a prefix, with or without a
    /// leading `#`. Returns `Ok(None)` when nothing matches and an error
    /// message when the prefix is ambiguous.
    pub fn resolve<'a, I>(
        reference: &str,
        known: I,
    ) -> std::result::Result<Option<Self>, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let prefix = reference.strip_prefix('#').unwrap_or(reference);
        if prefix.is_empty() {
            return Ok(None);
        }

        let mut matches: Vec<&str> = Vec::new();
        for id in known {
            if id == prefix {
                return Ok(Some(Self(id.to_string())));
            }
            if id.starts_with(prefix) {
                matches.push(id);
            }
        }

        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(Self((*only).to_string()))),
            many => Err(format!(
                "'{reference}' matches {} notes; use a longer prefix",
                many.len()
            )),
        }
    }
}

/// Short display form of any id string.
pub fn short_of(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(SHORT_LEN)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short())
    }
}
