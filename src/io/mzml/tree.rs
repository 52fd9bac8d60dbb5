//! A generic, fully materialized element tree for mzML documents.
//!
//! Every element becomes a [`Node`]. `<cvParam>` children are folded into the node's
//! parameter list, and every other child element is stored in an ordered list keyed
//! by its tag, so `spectrum.child("precursorList")` and friends read like the schema.
use std::io;

use indexmap::IndexMap;
use log::trace;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;

use crate::impl_param_described;
use crate::params::{CvRole, ParamDescribed, ParamList, ParamLike};

use super::reading_shared::{CVParamParse, MzMLParserError, MzMLParserState, XMLParseBase};

/// One element of a document tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    pub params: ParamList,
    /// Child elements grouped by tag, in the order each tag first appeared
    pub children: IndexMap<String, Vec<Node>>,
    pub text: Option<String>,
}

impl_param_described!(Node);

impl Node {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn set_attribute<K: Into<String>, V: ToString>(&mut self, name: K, value: V) {
        self.attributes.insert(name.into(), value.to_string());
    }

    /// Builder form of [`Node::set_attribute`]
    pub fn with_attribute<K: Into<String>, V: ToString>(mut self, name: K, value: V) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_param(mut self, param: crate::params::Param) -> Self {
        self.add_param(param);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.push_child(child);
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn push_child(&mut self, child: Node) {
        self.children
            .entry(child.tag.clone())
            .or_default()
            .push(child);
    }

    /// All children with the tag `role`, in document order
    pub fn children(&self, role: &str) -> &[Node] {
        self.children.get(role).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The first child with the tag `role`
    pub fn child(&self, role: &str) -> Option<&Node> {
        self.children(role).first()
    }

    /// Follow a path of tags, taking the first child at each step
    pub fn descend(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(self, |node, role| node.child(role))
    }

    /// The value of the first parameter carrying `role`. An empty value is reported as `Some("")`.
    pub fn param_value(&self, role: CvRole) -> Option<&str> {
        self.get_param_by_role(role).map(|p| p.value())
    }

    pub fn has_param(&self, role: CvRole) -> bool {
        self.get_param_by_role(role).is_some()
    }

    /// Parse a complete document from `source`, returning its root element
    pub fn parse<R: io::BufRead>(source: R) -> Result<Node, MzMLParserError> {
        TreeBuilder::default().build(source)
    }

    pub fn parse_str(source: &str) -> Result<Node, MzMLParserError> {
        Self::parse(source.as_bytes())
    }
}

#[derive(Debug)]
struct TreeBuilder {
    stack: Vec<Node>,
    root: Option<Node>,
    state: MzMLParserState,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            root: None,
            state: MzMLParserState::Start,
        }
    }
}

impl XMLParseBase for TreeBuilder {}
impl CVParamParse for TreeBuilder {}

impl TreeBuilder {
    fn open_node(&self, event: &BytesStart, position: usize) -> Result<Node, MzMLParserError> {
        let tag = String::from_utf8_lossy(event.local_name().as_ref()).into_owned();
        let mut node = Node::new(tag);
        for attr in event.attributes() {
            let attr = attr
                .map_err(|e| self.handle_xml_error(e.into(), self.state, position))?;
            let value = attr
                .unescape_value()
                .map_err(|e| self.handle_xml_error(e, self.state, position))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            node.attributes.insert(key, value.into_owned());
        }
        Ok(node)
    }

    fn attach(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.push_child(node),
            None => {
                self.state = MzMLParserState::Done;
                self.root = Some(node);
            }
        }
    }

    fn append_text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            match top.text.as_mut() {
                Some(buf) => buf.push_str(text),
                None => top.text = Some(text.to_string()),
            }
        }
    }

    fn build<R: io::BufRead>(mut self, source: R) -> Result<Node, MzMLParserError> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        let mut buffer = Vec::new();
        loop {
            let position = reader.buffer_position();
            match reader.read_event_into(&mut buffer) {
                Ok(Event::Start(ref e)) => {
                    let node = self.open_node(e, position)?;
                    self.state = MzMLParserState::Element;
                    self.stack.push(node);
                }
                Ok(Event::Empty(ref e)) => {
                    if e.local_name().as_ref() == b"cvParam" {
                        let param = self.handle_param(e, position)?;
                        if let Some(top) = self.stack.last_mut() {
                            top.params.push(param);
                        }
                    } else {
                        let node = self.open_node(e, position)?;
                        self.attach(node);
                    }
                }
                Ok(Event::End(ref e)) => {
                    let found = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    match self.stack.pop() {
                        Some(node) if node.tag == found => self.attach(node),
                        Some(node) => {
                            return Err(MzMLParserError::MismatchedTag {
                                expected: node.tag,
                                found,
                            })
                        }
                        None => {
                            return Err(MzMLParserError::IncompleteElementError(
                                found,
                                self.state,
                            ))
                        }
                    }
                }
                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| self.handle_xml_error(err, self.state, position))?;
                    self.append_text(&text);
                }
                Ok(Event::CData(ref e)) => {
                    let text = String::from_utf8_lossy(&e.clone().into_inner()).into_owned();
                    self.append_text(&text);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    self.state = MzMLParserState::ParserError;
                    return Err(self.handle_xml_error(err, MzMLParserState::ParserError, position));
                }
            }
            buffer.clear();
        }
        if let Some(open) = self.stack.pop() {
            return Err(MzMLParserError::IncompleteElementError(
                open.tag,
                self.state,
            ));
        }
        let root = self.root.ok_or(MzMLParserError::EmptyDocument)?;
        trace!("Parsed document tree rooted at <{}>", root.tag);
        Ok(root)
    }
}

/// Serialize a parameter as a `<cvParam>` element
pub(crate) fn param_element<P: ParamLike>(param: &P) -> BytesStart<'static> {
    let mut elt = BytesStart::new("cvParam");
    if let Some(curie) = param.curie() {
        if let Some(cv) = param.controlled_vocabulary() {
            elt.push_attribute(("cvRef", cv.prefix().as_ref()));
        }
        elt.push_attribute(("accession", curie.as_str()));
    }
    elt.push_attribute(("name", param.name()));
    elt.push_attribute(("value", param.value()));
    let (unit_acc, unit_name) = param.unit().for_param();
    if !unit_acc.is_empty() {
        let prefix = unit_acc.split(':').next().unwrap_or("UO");
        elt.push_attribute(("unitCvRef", prefix));
        elt.push_attribute(("unitAccession", unit_acc));
        elt.push_attribute(("unitName", unit_name));
    }
    elt
}

/// The opening tag of `node`, with its attributes
pub(crate) fn start_element(node: &Node) -> BytesStart<'_> {
    let mut elt = BytesStart::new(node.tag.as_str());
    for (k, v) in node.attributes.iter() {
        elt.push_attribute((k.as_str(), v.as_str()));
    }
    elt
}

pub(crate) fn text_event(text: &str) -> Event<'_> {
    Event::Text(BytesText::new(text))
}

#[cfg(test)]
mod test {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
  <run id="run1">
    <spectrumList count="1">
      <spectrum id="scan=1" index="0" defaultArrayLength="0">
        <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="2"/>
        <cvParam cvRef="MS" accession="MS:1000130" name="positive scan" value=""/>
        <userParam name="note" value="x &amp; y"/>
        <scanList count="1">
          <scan>
            <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="90" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>
          </scan>
        </scanList>
        <binaryDataArrayList count="1">
          <binaryDataArray encodedLength="0">
            <binary></binary>
          </binaryDataArray>
        </binaryDataArrayList>
      </spectrum>
    </spectrumList>
  </run>
</mzML>"#;

    #[test]
    fn test_parse_tree() -> Result<(), MzMLParserError> {
        let root = Node::parse_str(DOC)?;
        assert_eq!(root.tag, "mzML");
        assert_eq!(root.attribute("version"), Some("1.1.0"));
        let spectrum = root
            .descend(&["run", "spectrumList", "spectrum"])
            .expect("spectrum");
        assert_eq!(spectrum.attribute("id"), Some("scan=1"));
        assert_eq!(spectrum.params.len(), 2);
        assert_eq!(spectrum.param_value(CvRole::MsLevel), Some("2"));
        assert!(spectrum.has_param(CvRole::PositiveScan));
        assert_eq!(spectrum.children("userParam")[0].attribute("value"), Some("x & y"));

        let scan = spectrum.descend(&["scanList", "scan"]).expect("scan");
        let rt = scan.get_param_by_role(CvRole::ScanStartTime).unwrap();
        assert_eq!(rt.unit, crate::params::Unit::Second);

        let binary = spectrum
            .descend(&["binaryDataArrayList", "binaryDataArray", "binary"])
            .unwrap();
        assert_eq!(binary.text, None);
        assert!(spectrum.child("precursorList").is_none());
        assert!(spectrum.children("precursorList").is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed() {
        assert!(Node::parse_str("<mzML><run></mzML>").is_err());
        assert!(Node::parse_str("<mzML><run>").is_err());
        assert!(matches!(
            Node::parse_str("   "),
            Err(MzMLParserError::EmptyDocument)
        ));
    }
}
