//! Composition of description, attachment and tag queries.

use tantivy::{
    Index,
    Term,
    query::{
        AllQuery,
        BooleanQuery,
        Occur,
        PhraseQuery,
        Query,
        QueryParser,
        TermQuery,
    },
    schema::{Field, IndexRecordOption},
    tokenizer::TokenStream,
};
use tracing::debug;

use crate::{error::Result, note::normalize_tags, tantivy_index::SchemaFields};

pub(crate) struct QueryBuilder<'a> {
    index: &'a Index,
    fields: &'a SchemaFields,
    slop: u32,
    /// Attachment slots searched; the index may define more.
    slots: usize,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(
        index: &'a Index,
        fields: &'a SchemaFields,
        slop: u32,
        slots: usize,
    ) -> Self {
        Self {
            index,
            fields,
            slop,
            slots,
        }
    }

    /// Build the query for a description search filtered by tags.
    ///
    /// A blank `text` drops the description clause. The description and tag
    /// clauses are both required when present; with neither, every note
    /// matches.
    pub(crate) fn build(
        &self,
        text: &str,
        phrase: bool,
        tags: &[String],
    ) -> Result<Box<dyn Query>> {
        let description = if text.trim().is_empty() {
            None
        } else if phrase {
            Some(self.phrase_query(text)?)
        } else {
            Some(self.term_query(text)?)
        };
        let tags = tags_query(self.fields.tag, tags);

        let query = combine(description, tags);
        debug!(?query, "composed search query");
        Ok(query)
    }

    /// Any of the description, attachment notes or attachment file names
    /// containing the phrase qualifies.
    fn phrase_query(&self, text: &str) -> Result<Box<dyn Query>> {
        let mut clauses = Vec::new();
        for field in std::iter::once(self.fields.description)
            .chain(self.attachment_fields())
        {
            if let Some(query) = self.field_phrase(field, text)? {
                clauses.push((Occur::Should, query));
            }
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    /// The description must match; attachment matches only add score.
    fn term_query(&self, text: &str) -> Result<Box<dyn Query>> {
        let mut clauses =
            vec![(Occur::Must, self.parse(self.fields.description, text)?)];
        for field in self.attachment_fields() {
            clauses.push((Occur::Should, self.parse(field, text)?));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    /// `attach-note_i` then `attach-file_i` for every searched slot.
    fn attachment_fields(&self) -> impl Iterator<Item = Field> + '_ {
        let slots =
            &self.fields.slots[..self.slots.min(self.fields.slots.len())];
        let notes = slots.iter().map(|slot| slot.note);
        let files = slots.iter().map(|slot| slot.file);
        notes.chain(files)
    }

    /// Phrase query over the analyzed tokens of `text`, keeping their
    /// positions. A single token becomes a term query and no tokens at all
    /// yields no clause.
    fn field_phrase(
        &self,
        field: Field,
        text: &str,
    ) -> Result<Option<Box<dyn Query>>> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while stream.advance() {
            let token = stream.token();
            terms.push((
                token.position,
                Term::from_field_text(field, &token.text),
            ));
        }

        Ok(match terms.len() {
            0 => None,
            1 => Some(Box::new(TermQuery::new(
                terms.remove(0).1,
                IndexRecordOption::WithFreqs,
            ))),
            _ => {
                let mut query = PhraseQuery::new_with_offset(terms);
                query.set_slop(self.slop);
                Some(Box::new(query))
            }
        })
    }

    fn parse(&self, field: Field, text: &str) -> Result<Box<dyn Query>> {
        let parser = QueryParser::for_index(self.index, vec![field]);
        Ok(parser.parse_query(text)?)
    }
}

/// Exact match on every given tag.
fn tags_query(field: Field, tags: &[String]) -> Option<Box<dyn Query>> {
    let tags = normalize_tags(tags);
    if tags.is_empty() {
        return None;
    }
    let clauses = tags
        .iter()
        .map(|tag| {
            let query: Box<dyn Query> = Box::new(TermQuery::new(
                Term::from_field_text(field, tag),
                IndexRecordOption::Basic,
            ));
            (Occur::Must, query)
        })
        .collect();
    Some(Box::new(BooleanQuery::new(clauses)))
}

fn combine(
    description: Option<Box<dyn Query>>,
    tags: Option<Box<dyn Query>>,
) -> Box<dyn Query> {
    match (description, tags) {
        (Some(description), Some(tags)) => Box::new(BooleanQuery::new(vec![
            (Occur::Must, description),
            (Occur::Must, tags),
        ])),
        (Some(query), None) | (None, Some(query)) => query,
        (None, None) => Box::new(AllQuery),
    }
}
