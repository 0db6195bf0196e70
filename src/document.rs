//! Owned XML tree used for both the run configuration template and every
//! generated document.
//!
//! Nodes are addressed through typed accessors (`elements`, `find_child_mut`,
//! `set_attribute`) rather than string paths.

use crate::error::{Result, RunconfError};
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};

/// Indentation used when serializing documents
const INDENT_WIDTH: usize = 4;

/// XML declaration (`<?xml version="1.0" encoding="UTF-8"?>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A parsed document: optional declaration plus a single root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub declaration: Option<Declaration>,
    pub root: Element,
}

/// Child of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

/// An element with ordered attributes and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute setter
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Sets an attribute, keeping its position if it already exists
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn push_child(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// Inserts `element` before every existing child
    pub fn prepend_child(&mut self, element: Element) {
        self.children.insert(0, Node::Element(element));
    }

    /// Child elements, skipping text and comments
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    #[must_use]
    pub fn first_element(&self) -> Option<&Element> {
        self.elements().next()
    }

    pub fn first_element_mut(&mut self) -> Option<&mut Element> {
        self.elements_mut().next()
    }

    /// First child element matching `predicate`
    pub fn find_child<P>(&self, mut predicate: P) -> Option<&Element>
    where
        P: FnMut(&Element) -> bool,
    {
        self.elements().find(|e| predicate(e))
    }

    pub fn find_child_mut<P>(&mut self, mut predicate: P) -> Option<&mut Element>
    where
        P: FnMut(&Element) -> bool,
    {
        self.elements_mut().find(|e| predicate(e))
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_to(writer)?,
                Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
                Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data)))?,
                Node::Comment(comment) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?;
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

impl Document {
    /// Parses XML text into an owned tree.
    ///
    /// Whitespace-only text is dropped; processing instructions and doctypes are ignored.
    ///
    /// # Errors
    ///
    /// - `RunconfError::Xml` if the text is not well-formed.
    /// - `RunconfError::EmptyDocument` if there is no root element.
    /// - `RunconfError::MultipleRoots` if a second top-level element follows the root.
    /// - `RunconfError::XmlAttribute` if an attribute is malformed.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut declaration = None;
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Decl(decl) => declaration = Some(read_declaration(&decl)?),
                Event::Start(start) => stack.push(read_element(&start)?),
                Event::Empty(start) => {
                    let element = read_element(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element)?;
                    }
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text.unescape()?.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(Node::CData(data));
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        let comment = String::from_utf8_lossy(&comment.into_inner()).into_owned();
                        parent.children.push(Node::Comment(comment));
                    }
                }
                Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        let root = root.ok_or(RunconfError::EmptyDocument)?;

        Ok(Self { declaration, root })
    }

    /// Serializes the document with four-space indentation.
    ///
    /// # Errors
    ///
    /// Returns `RunconfError::Io` or `RunconfError::Xml` if writing fails.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_WIDTH);

        if let Some(decl) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )))?;
        }
        self.root.write_to(&mut writer)?;

        let mut xml = String::from_utf8_lossy(&writer.into_inner()).into_owned();
        xml.push('\n');
        Ok(xml)
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match (stack.last_mut(), root.as_ref()) {
        (Some(parent), _) => parent.push_child(element),
        (None, None) => *root = Some(element),
        (None, Some(first)) => {
            return Err(RunconfError::MultipleRoots {
                root: first.name.clone(),
                extra: element.name,
            });
        }
    }
    Ok(())
}

fn read_element(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}

fn read_declaration(decl: &BytesDecl<'_>) -> Result<Declaration> {
    let version = String::from_utf8_lossy(&decl.version()?).into_owned();
    let encoding = decl
        .encoding()
        .transpose()?
        .map(|e| String::from_utf8_lossy(&e).into_owned());
    let standalone = decl
        .standalone()
        .transpose()?
        .map(|s| String::from_utf8_lossy(&s).into_owned());
    Ok(Declaration {
        version,
        encoding,
        standalone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<component name="ProjectRunConfigurationManager">
  <configuration default="false" name="Template" type="SpringBootApplicationConfigurationType">
    <!-- launcher -->
    <option name="SPRING_BOOT_MAIN_CLASS" value="" />
    <module name="" />
    <method v="2">
      <option name="Make" enabled="true" />
    </method>
    <description>a &amp; b</description>
  </configuration>
</component>
"#;

    #[test]
    fn test_parse_structure() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(
            doc.declaration.as_ref().map(|d| d.version.as_str()),
            Some("1.0")
        );
        assert_eq!(doc.root.name, "component");

        let config = doc.root.first_element().unwrap();
        assert_eq!(config.name, "configuration");
        assert_eq!(config.attribute("type"), Some("SpringBootApplicationConfigurationType"));
        assert_eq!(config.elements().count(), 4);
        assert!(matches!(config.children[0], Node::Comment(_)));

        let description = config.find_child(|e| e.name == "description").unwrap();
        assert_eq!(description.children, vec![Node::Text("a & b".to_string())]);
    }

    #[test]
    fn test_attribute_order_is_preserved() {
        let doc = Document::parse(SAMPLE).unwrap();
        let config = doc.root.first_element().unwrap();
        let keys: Vec<&str> = config.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["default", "name", "type"]);
    }

    #[test]
    fn test_round_trip_after_mutation() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let config = doc.root.first_element_mut().unwrap();
        config.set_attribute("name", "ServiceADev");
        config.prepend_child(Element::new("envs").with_attribute("k", "<v>"));

        let xml = doc.to_xml_string().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("&lt;v&gt;"));

        let reparsed = Document::parse(&xml).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_serialization_indents_four_spaces() {
        let doc = Document {
            declaration: None,
            root: {
                let mut root = Element::new("a");
                root.push_child(Element::new("b").with_attribute("x", "1"));
                root
            },
        };
        assert_eq!(doc.to_xml_string().unwrap(), "<a>\n    <b x=\"1\"/>\n</a>\n");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Document::parse("<a><b></a>").is_err());
        assert!(Document::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_second_root() {
        let result = Document::parse("<a/><b/>");
        assert!(matches!(
            result,
            Err(RunconfError::MultipleRoots { ref root, ref extra }) if root == "a" && extra == "b"
        ));

        let result = Document::parse("<component><x/></component>\n<component/>");
        assert!(matches!(result, Err(RunconfError::MultipleRoots { .. })));
    }
}
