use std::io;

use quick_xml::events::BytesStart;
use quick_xml::Error as XMLError;

use thiserror::Error;

use crate::params::{curie_to_num, ControlledVocabulary, Param, Unit};

/**
The phases the document tree builder moves through. Only needed by the module
consumer to tell where in the document an error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum MzMLParserState {
    Start = 0,
    /// Inside the element tree
    Element,
    /// Reading a `<cvParam>` element
    CVParam,
    /// The root element has been closed
    Done,
    ParserError,
}

/**
All the ways that building a document tree from XML can go wrong
*/
#[derive(Debug, Error)]
pub enum MzMLParserError {
    #[error("The document contained no root element")]
    EmptyDocument,
    #[error("An incomplete element {0} was encountered in {1:?}")]
    IncompleteElementError(String, MzMLParserState),
    #[error("A closing tag {found} did not match the open element {expected}")]
    MismatchedTag { expected: String, found: String },
    #[error("An XML error {1:?} was encountered in {0:?} at byte {2}")]
    XMLError(MzMLParserState, #[source] XMLError, usize),
    #[error("An IO error {1} was encountered in {0:?}")]
    IOError(MzMLParserState, #[source] io::Error),
}

impl From<MzMLParserError> for io::Error {
    fn from(value: MzMLParserError) -> Self {
        match value {
            MzMLParserError::IOError(_, ref e) => io::Error::new(e.kind(), value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/**
Common XML error handling behaviors
*/
pub trait XMLParseBase {
    fn handle_xml_error(
        &self,
        error: XMLError,
        state: MzMLParserState,
        reader_position: usize,
    ) -> MzMLParserError {
        match error {
            XMLError::Io(e) => MzMLParserError::IOError(
                state,
                io::Error::new(e.kind(), e.to_string()),
            ),
            e => MzMLParserError::XMLError(state, e, reader_position),
        }
    }
}

/**
Common `cvParam` parsing behaviors
*/
pub trait CVParamParse: XMLParseBase {
    fn handle_param(
        &self,
        event: &BytesStart,
        reader_position: usize,
    ) -> Result<Param, MzMLParserError> {
        let state = MzMLParserState::CVParam;
        let mut param = Param::new();
        let mut unit_name = None;
        let mut unit_accession = None;
        for attr_parsed in event.attributes() {
            let attr = attr_parsed
                .map_err(|e| self.handle_xml_error(e.into(), state, reader_position))?;
            let value = attr
                .unescape_value()
                .map_err(|e| self.handle_xml_error(e, state, reader_position))?;
            match attr.key.as_ref() {
                b"name" => {
                    param.name = value.to_string();
                }
                b"value" => {
                    param.value = value.to_string();
                }
                b"cvRef" => {
                    param.controlled_vocabulary = value
                        .parse::<ControlledVocabulary>()
                        .ok()
                        .and_then(|cv| cv.as_option());
                }
                b"accession" => {
                    let (cv, acc) = curie_to_num(&value);
                    param.accession = acc;
                    if param.controlled_vocabulary.is_none() {
                        param.controlled_vocabulary = cv;
                    }
                }
                b"unitName" => {
                    unit_name = Some(value.to_string());
                }
                b"unitAccession" => {
                    unit_accession = Some(value.to_string());
                }
                b"unitCvRef" => {}
                _ => {}
            }
        }
        param.unit = match (unit_accession, unit_name) {
            (Some(acc), Some(name)) => Param::new().with_unit(acc, name).unit,
            (Some(acc), None) => Unit::from_accession(&acc),
            (None, Some(name)) => Unit::from_name(&name),
            (None, None) => Unit::Unknown,
        };
        Ok(param)
    }
}
