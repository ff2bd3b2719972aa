//! Reads the news corpus CSV into `DocumentRecord`s ready for indexing.

use std::collections::BTreeMap;
use std::path::Path;

use crate::semantic::metadata::MetadataError;
use crate::types::DocumentRecord;

const TITLE_COLUMN: &str = "title";
const URL_COLUMN: &str = "url";

/// Load every row with non-blank text.
///
/// Rows are filtered on the text column first. When `id_column` is absent
/// the id is the row's position among the kept rows. Ids are accepted as
/// integers or integral floats (`12.0`); rows with any other id are dropped.
/// Duplicate ids are kept here and resolved by the builder. Empty extra
/// cells are left out of `metadata`, matching what the metadata table reads back.
pub fn load_documents(
    path: &Path,
    id_column: &str,
    text_column: &str,
) -> Result<Vec<DocumentRecord>, MetadataError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let text_pos =
        position(text_column).ok_or_else(|| MetadataError::MissingColumn(text_column.to_string()))?;
    let id_pos = position(id_column);
    let title_pos = position(TITLE_COLUMN);
    let url_pos = position(URL_COLUMN);

    let mut documents = vec![];
    let mut blank = 0usize;
    let mut bad_ids = 0usize;

    for record in reader.records() {
        let record = record?;
        let text = record.get(text_pos).unwrap_or_default();
        if text.trim().is_empty() {
            blank += 1;
            continue;
        }

        let vector_id = match id_pos {
            Some(pos) => match parse_id(record.get(pos).unwrap_or_default()) {
                Some(id) => id,
                None => {
                    bad_ids += 1;
                    continue;
                }
            },
            None => documents.len() as i64,
        };

        let field = |pos: Option<usize>| {
            pos.and_then(|p| record.get(p))
                .unwrap_or_default()
                .to_string()
        };

        let metadata: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, _)| {
                *i != text_pos
                    && Some(*i) != id_pos
                    && Some(*i) != title_pos
                    && Some(*i) != url_pos
            })
            .filter(|(_, (_, v))| !v.is_empty())
            .map(|(_, (h, v))| (h.to_string(), v.to_string()))
            .collect();

        documents.push(DocumentRecord {
            vector_id,
            title: field(title_pos),
            url: field(url_pos),
            article_content: text.to_string(),
            metadata,
        });
    }

    log::info!(
        "loaded {} documents from {} (blank={blank} invalid_id={bad_ids})",
        documents.len(),
        path.display()
    );

    Ok(documents)
}

fn parse_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    let float = raw.parse::<f64>().ok()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("news.csv");
        std::fs::write(&path, contents).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_blank_rows_filtered_before_ids_assigned() {
        let (_tmp, path) = write_csv(
            "title,url,article_content,sentiment\n\
             A,https://a,first body,pos\n\
             B,https://b,   ,neg\n\
             C,https://c,third body,neu\n",
        );

        let docs = load_documents(&path, "news_id", "article_content").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].vector_id, 0);
        assert_eq!(docs[1].vector_id, 1);
        assert_eq!(docs[1].title, "C");
        assert_eq!(docs[1].metadata.get("sentiment").unwrap(), "neu");
    }

    #[test]
    fn test_existing_ids_coerced() {
        let (_tmp, path) = write_csv(
            "news_id,article_content\n\
             10,alpha\n\
             11.0,beta\n\
             abc,gamma\n\
             ,delta\n\
             10,epsilon\n",
        );

        let docs = load_documents(&path, "news_id", "article_content").unwrap();
        let ids: Vec<i64> = docs.iter().map(|d| d.vector_id).collect();
        assert_eq!(ids, vec![10, 11, 10]);
        assert_eq!(docs[0].title, "");
    }

    #[test]
    fn test_empty_extra_cells_match_reloaded_table() {
        let (tmp, path) = write_csv(
            "news_id,title,article_content,sentiment,published_at\n\
             1,A,first body,,2024-11-02\n\
             2,B,second body,neg,\n",
        );

        let docs = load_documents(&path, "news_id", "article_content").unwrap();
        assert!(!docs[0].metadata.contains_key("sentiment"));
        assert!(!docs[1].metadata.contains_key("published_at"));

        let table_path = tmp.path().join("meta.csv");
        crate::semantic::MetadataTable::from_records(docs.clone())
            .unwrap()
            .save(&table_path)
            .unwrap();
        let reloaded = crate::semantic::MetadataTable::load(&table_path).unwrap();
        for doc in &docs {
            assert_eq!(reloaded.get(doc.vector_id).unwrap(), doc);
        }
    }

    #[test]
    fn test_missing_text_column() {
        let (_tmp, path) = write_csv("title,body\nA,b\n");
        let result = load_documents(&path, "news_id", "article_content");
        assert!(matches!(result, Err(MetadataError::MissingColumn(_))));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(" 7 "), Some(7));
        assert_eq!(parse_id("-3"), Some(-3));
        assert_eq!(parse_id("4.0"), Some(4));
        assert_eq!(parse_id("4.5"), None);
        assert_eq!(parse_id("NaN"), None);
        assert_eq!(parse_id(""), None);
    }
}
