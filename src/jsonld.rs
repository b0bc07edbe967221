use serde_json::{Map, Value, json};

use crate::domain::{Namespaces, output_type};
use crate::error::PubtatorError;
use crate::pubtator::{Annotation, Document, SpanAnnotation};

fn target(document_url: &str, span: &SpanAnnotation) -> String {
    format!("{document_url}/text#char={},{}", span.start, span.end)
}

fn for_each_span<F>(document: &Document, mut emit: F) -> Result<(), PubtatorError>
where
    F: FnMut(&SpanAnnotation) -> Result<(), PubtatorError>,
{
    for annotation in &document.annotations {
        match annotation {
            Annotation::Span(span) => emit(span)?,
            Annotation::Relation(_) => {
                tracing::warn!("not converting RelationAnnotation in {}", document.id)
            }
        }
    }
    Ok(())
}

/// Plain JSON: one object per (span, norm).
pub fn span_objects(span: &SpanAnnotation, namespaces: &Namespaces) -> Result<Vec<Value>, PubtatorError> {
    span.norms(namespaces)?
        .into_iter()
        .map(|norm| {
            let mut object = Map::new();
            object.insert("start".to_string(), json!(span.start));
            object.insert("end".to_string(), json!(span.end));
            object.insert("text".to_string(), json!(span.text));
            object.insert("type".to_string(), json!(output_type(&span.kind)));
            if let Some(norm) = norm {
                object.insert("norm".to_string(), json!(norm));
            }
            Ok(Value::Object(object))
        })
        .collect()
}

pub fn document_json(document: &Document, namespaces: &Namespaces) -> Result<Value, PubtatorError> {
    let mut annotations = Vec::new();
    for_each_span(document, |span| {
        annotations.extend(span_objects(span, namespaces)?);
        Ok(())
    })?;
    let abstracts = document
        .abstracts()
        .map(|text| json!({ "text": text }))
        .collect::<Vec<_>>();
    Ok(json!({
        "_id": document.id,
        "title": document.title(),
        "abstract": abstracts,
        "annotations": annotations,
    }))
}

/// Open Annotation JSON-LD: `@id`/`@type` keys, the norm as a plain body.
pub fn oa_annotations(
    document: &Document,
    namespaces: &Namespaces,
    base: &str,
) -> Result<Value, PubtatorError> {
    let url = format!("{base}{}", document.id);
    let mut objects = Vec::new();
    for_each_span(document, |span| {
        for norm in span.norms(namespaces)? {
            let mut object = Map::new();
            object.insert(
                "@id".to_string(),
                json!(format!("{url}/annotations/{}", objects.len())),
            );
            object.insert("@type".to_string(), json!(output_type(&span.kind)));
            object.insert("target".to_string(), json!(target(&url, span)));
            object.insert("text".to_string(), json!(span.text));
            if let Some(norm) = norm {
                object.insert("body".to_string(), json!(norm));
            }
            objects.push(Value::Object(object));
        }
        Ok(())
    })?;
    Ok(Value::Array(objects))
}

/// Web Annotation JSON-LD: `Span` annotations with a typed body.
pub fn wa_annotations(
    document: &Document,
    namespaces: &Namespaces,
    base: &str,
) -> Result<Value, PubtatorError> {
    let url = format!("{base}{}", document.id);
    let mut objects = Vec::new();
    for_each_span(document, |span| {
        for norm in span.norms(namespaces)? {
            let mut body = Map::new();
            body.insert("type".to_string(), json!(output_type(&span.kind)));
            if let Some(norm) = norm {
                body.insert("id".to_string(), json!(norm));
            }
            objects.push(json!({
                "id": format!("{url}/ann/{}", objects.len()),
                "type": "Span",
                "target": target(&url, span),
                "body": body,
                "text": span.text,
            }));
        }
        Ok(())
    })?;
    Ok(Value::Array(objects))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubtator::TextSection;

    fn document() -> Document {
        let text = "SOD1 and 2 in mice.";
        Document {
            id: "42".to_string(),
            sections: vec![
                TextSection {
                    label: 't',
                    text: text.to_string(),
                },
                TextSection {
                    label: 'a',
                    text: "Abstract.".to_string(),
                },
            ],
            annotations: vec![
                Annotation::Span(
                    SpanAnnotation::parse("42\t0\t10\tSOD1 and 2\tGene\t6647;6648", 1).unwrap(),
                ),
                Annotation::Span(SpanAnnotation::parse("42\t14\t18\tmice\tSpecies\t", 1).unwrap()),
            ],
        }
    }

    #[test]
    fn wa_ids_count_emitted_objects() {
        let value = wa_annotations(&document(), &Namespaces::default(), "PMID:").unwrap();
        let objects = value.as_array().unwrap();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0]["id"], "PMID:42/ann/0");
        assert_eq!(objects[1]["id"], "PMID:42/ann/1");
        assert_eq!(objects[1]["body"]["id"], "NCBIGENE:6648");
        assert_eq!(objects[2]["target"], "PMID:42/text#char=14,18");
        assert_eq!(objects[2]["body"], json!({ "type": "Species" }));
    }

    #[test]
    fn oa_uses_linked_data_keys() {
        let value = oa_annotations(&document(), &Namespaces::default(), "pubmed/").unwrap();
        let objects = value.as_array().unwrap();
        assert_eq!(objects[0]["@id"], "pubmed/42/annotations/0");
        assert_eq!(objects[0]["@type"], "Gene");
        assert_eq!(objects[0]["body"], "NCBIGENE:6647");
        assert!(objects[2].get("body").is_none());
    }

    #[test]
    fn plain_json_has_text_and_annotations() {
        let value = document_json(&document(), &Namespaces::default()).unwrap();
        assert_eq!(value["_id"], "42");
        assert_eq!(value["abstract"], json!([{ "text": "Abstract." }]));
        assert_eq!(value["annotations"].as_array().unwrap().len(), 3);
        assert!(value["annotations"][2].get("norm").is_none());
    }
}
