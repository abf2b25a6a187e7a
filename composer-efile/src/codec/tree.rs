//! Markup tokenizer → element tree
//!
//! Builds a minimal owned tree from quick-xml events. Only what folding needs
//! is kept: tag, attributes in document order, element children, and whether
//! any direct text exists. Comments, processing instructions and doctype
//! declarations are skipped.

use super::CodecError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenation of every direct text and CDATA segment
    pub text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, CodecError> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| {
                CodecError::MalformedDocument(format!("bad attribute in <{}>: {}", tag, e))
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| {
                    CodecError::MalformedDocument(format!(
                        "bad value for attribute '{}' in <{}>: {}",
                        key, tag, e
                    ))
                })?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            tag,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }
}

/// Parse a cleaned document into its single root element
pub fn parse(doc: &str) -> Result<Element, CodecError> {
    let mut reader = Reader::from_str(doc);
    reader.trim_text(false);
    reader.check_end_names(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            CodecError::MalformedDocument(format!(
                "at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => {
                ensure_no_second_root(&root, &stack)?;
                stack.push(Element::open(&start)?);
            }
            Event::Empty(start) => {
                ensure_no_second_root(&root, &stack)?;
                let element = Element::open(&start)?;
                attach(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    CodecError::MalformedDocument("closing tag without opening tag".to_string())
                })?;
                attach(element, &mut stack, &mut root);
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| CodecError::MalformedDocument(format!("bad text: {}", e)))?;
                push_text(&text, &mut stack)?;
            }
            Event::CData(cdata) => {
                let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                push_text(&text, &mut stack)?;
            }
            Event::Eof => break,
            Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(CodecError::MalformedDocument(format!(
            "unclosed element <{}>",
            open.tag
        )));
    }

    root.ok_or_else(|| CodecError::MalformedDocument("document has no root element".to_string()))
}

fn ensure_no_second_root(root: &Option<Element>, stack: &[Element]) -> Result<(), CodecError> {
    if stack.is_empty() {
        if let Some(existing) = root {
            return Err(CodecError::MalformedDocument(format!(
                "second root element after <{}>",
                existing.tag
            )));
        }
    }
    Ok(())
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn push_text(text: &str, stack: &mut [Element]) -> Result<(), CodecError> {
    match stack.last_mut() {
        Some(current) => {
            current.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(CodecError::MalformedDocument(
            "text outside the root element".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_nested_tree() {
        let root = parse(r#"<Outer a="1"><Inner>x &amp; y</Inner><Leaf/></Outer>"#).unwrap();
        assert_eq!(root.tag, "Outer");
        assert_eq!(root.attributes, vec![("a".to_string(), "1".to_string())]);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].text, "x & y");
        assert_eq!(root.children[1].tag, "Leaf");
    }

    #[test]
    fn test_cdata_counts_as_text() {
        let root = parse("<A><![CDATA[<b>]]></A>").unwrap();
        assert_eq!(root.text, "<b>");
    }

    #[test]
    fn test_comments_ignored() {
        let root = parse("<A><!-- note --><B>1</B></A>").unwrap();
        assert!(root.text.is_empty());
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn test_mismatched_close_rejected() {
        assert!(matches!(
            parse("<A><B></A></B>"),
            Err(CodecError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_unclosed_rejected() {
        assert!(matches!(parse("<A><B>"), Err(CodecError::MalformedDocument(_))));
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(matches!(parse("   \n"), Err(CodecError::MalformedDocument(_))));
    }

    #[test]
    fn test_second_root_rejected() {
        assert!(matches!(parse("<A/><B/>"), Err(CodecError::MalformedDocument(_))));
    }

    #[test]
    fn test_stray_text_rejected() {
        assert!(matches!(parse("<A/>junk"), Err(CodecError::MalformedDocument(_))));
    }
}
