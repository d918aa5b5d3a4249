//! HTML responses as generic trees
//!
//! Converts a document into nested `{tag, content, attributes, children}`
//! maps so ordinary matchers (typically unsorted-array searches) can
//! assert on page structure.

use indexmap::IndexMap;
use scraper::{ElementRef, Html};

use crate::value::Value;

/// Parse an HTML document into a value tree rooted at the `<html>` element.
pub fn parse_html(body: &str) -> Value {
    let document = Html::parse_document(body);
    element_to_value(document.root_element())
}

fn element_to_value(element: ElementRef) -> Value {
    let mut node = IndexMap::new();
    node.insert(
        "tag".to_string(),
        Value::Str(element.value().name().to_string()),
    );

    let content: String = element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.to_string()))
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string();
    node.insert("content".to_string(), Value::Str(content));

    let mut attributes = IndexMap::new();
    for (name, value) in element.value().attrs() {
        attributes.insert(name.to_string(), Value::Str(value.to_string()));
    }
    node.insert("attributes".to_string(), Value::Map(attributes));

    let children: Vec<Value> = element
        .children()
        .filter_map(ElementRef::wrap)
        .map(element_to_value)
        .collect();
    node.insert("children".to_string(), Value::Seq(children));

    Value::Map(node)
}
