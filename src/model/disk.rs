use super::element::BlockElement;
use super::element::Element;
use super::element::FunctionElement;
use super::element::OperatorKind;
use super::element::SourceElement;
use super::element::SummaryElement;
use super::element::TypeKind;
use super::store::Store;
use crate::ElementId;
use crate::error::Error;
use byteorder::LE;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;

const MAGIC: u32 = 0x4746_4d53;
const VERSION: u32 = 1;

const KIND_SOURCE: u8 = 1;
const KIND_FUNCTION: u8 = 2;
const KIND_BLOCK: u8 = 3;
const KIND_SUMMARY: u8 = 4;

// persistence. the rewriter serializes the full store on exit, the fuzzer
// deserializes it on start. framing is little-endian with length-prefixed
// strings and id lists.
impl Store {
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let file = std::fs::File::create(path)?;
        let mut w = BufWriter::new(file);
        w.write_u32::<LE>(MAGIC)?;
        w.write_u32::<LE>(VERSION)?;
        w.write_u32::<LE>(self.peeked_next_id())?;
        w.write_u32::<LE>(self.sources().len() as u32)?;
        for (path, id) in self.sources() {
            write_string(&mut w, path)?;
            w.write_u32::<LE>(*id)?;
        }
        w.write_u32::<LE>(self.elements().len() as u32)?;
        for element in self.elements().values() {
            write_element(&mut w, element)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let malformed = |reason: &str| Error::Model {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let file = std::fs::File::open(path).map_err(|e| Error::Model {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut r = BufReader::new(file);
        if r.read_u32::<LE>()? != MAGIC {
            return Err(malformed("bad magic"));
        }
        if r.read_u32::<LE>()? != VERSION {
            return Err(malformed("unsupported version"));
        }
        let mut store = Store::default();
        let next_id = r.read_u32::<LE>()?;
        let num_sources = r.read_u32::<LE>()?;
        for _ in 0..num_sources {
            let source = read_string(&mut r)?;
            let id = r.read_u32::<LE>()?;
            store.restore_source(source, id);
        }
        let num_elements = r.read_u32::<LE>()?;
        for _ in 0..num_elements {
            let element = read_element(&mut r).map_err(|e| Error::Model {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            store.add(element.id(), element);
        }
        store.restore_next_id(next_id);
        Ok(store)
    }

    fn restore_source(&mut self, path: String, id: ElementId) {
        self.sources_mut().insert(path, id);
    }

    fn restore_next_id(&mut self, next_id: ElementId) {
        self.set_next_id(next_id);
    }
}

fn write_string<W: Write>(w: &mut W, value: &str) -> std::io::Result<()> {
    w.write_u16::<LE>(value.len() as u16)?;
    w.write_all(value.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> std::io::Result<String> {
    let length = r.read_u16::<LE>()? as usize;
    let mut bytes = vec![0u8; length];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(std::io::Error::other)
}

fn write_ids<W: Write>(w: &mut W, ids: &[ElementId]) -> std::io::Result<()> {
    w.write_u32::<LE>(ids.len() as u32)?;
    for id in ids {
        w.write_u32::<LE>(*id)?;
    }
    Ok(())
}

fn read_ids<R: Read>(r: &mut R) -> std::io::Result<Vec<ElementId>> {
    let length = r.read_u32::<LE>()? as usize;
    (0..length).map(|_| r.read_u32::<LE>()).collect()
}

fn write_element<W: Write>(w: &mut W, element: &Element) -> std::io::Result<()> {
    match element {
        Element::Source(e) => {
            w.write_u8(KIND_SOURCE)?;
            w.write_u32::<LE>(e.id)?;
            write_string(w, &e.path)?;
            write_ids(w, &e.functions)
        }
        Element::Function(e) => {
            w.write_u8(KIND_FUNCTION)?;
            w.write_u32::<LE>(e.id)?;
            w.write_u32::<LE>(e.source)?;
            write_string(w, &e.name)?;
            write_ids(w, &e.blocks)
        }
        Element::Block(e) => {
            w.write_u8(KIND_BLOCK)?;
            w.write_u32::<LE>(e.id)?;
            w.write_u32::<LE>(e.function)?;
            w.write_u32::<LE>(e.number)?;
            write_ids(w, &e.predecessors)?;
            write_ids(w, &e.summaries)
        }
        Element::Summary(e) => {
            w.write_u8(KIND_SUMMARY)?;
            w.write_u32::<LE>(e.id)?;
            w.write_u32::<LE>(e.block)?;
            w.write_u8(e.op.into())?;
            w.write_u8(e.ty.into())
        }
    }
}

fn read_element<R: Read>(r: &mut R) -> std::io::Result<Element> {
    let corrupt = |what: &str| std::io::Error::other(format!("corrupt element: {}", what));
    match r.read_u8()? {
        KIND_SOURCE => Ok(Element::Source(SourceElement {
            id: r.read_u32::<LE>()?,
            path: read_string(r)?,
            functions: read_ids(r)?,
        })),
        KIND_FUNCTION => Ok(Element::Function(FunctionElement {
            id: r.read_u32::<LE>()?,
            source: r.read_u32::<LE>()?,
            name: read_string(r)?,
            blocks: read_ids(r)?,
        })),
        KIND_BLOCK => Ok(Element::Block(BlockElement {
            id: r.read_u32::<LE>()?,
            function: r.read_u32::<LE>()?,
            number: r.read_u32::<LE>()?,
            predecessors: read_ids(r)?,
            summaries: read_ids(r)?,
        })),
        KIND_SUMMARY => Ok(Element::Summary(SummaryElement {
            id: r.read_u32::<LE>()?,
            block: r.read_u32::<LE>()?,
            op: OperatorKind::try_from(r.read_u8()?).map_err(|_| corrupt("operator"))?,
            ty: TypeKind::try_from(r.read_u8()?).map_err(|_| corrupt("type"))?,
        })),
        _ => Err(corrupt("kind tag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Store {
        let mut store = Store::default();
        let source = store.add_source("lib/parse.c");
        let function = store.next_id();
        let block = store.next_id();
        let goal = store.next_id();
        store.add(
            source,
            Element::Source(SourceElement {
                id: source,
                path: "lib/parse.c".into(),
                functions: vec![function],
            }),
        );
        store.add(
            function,
            Element::Function(FunctionElement {
                id: function,
                source,
                name: "parse_header".into(),
                blocks: vec![block],
            }),
        );
        store.add(
            block,
            Element::Block(BlockElement {
                id: block,
                function,
                number: 4,
                predecessors: vec![],
                summaries: vec![goal],
            }),
        );
        store.add(
            goal,
            Element::Summary(SummaryElement {
                id: goal,
                block,
                op: OperatorKind::IntegerMayOverflow,
                ty: TypeKind::Integer,
            }),
        );
        store
    }

    #[test]
    fn round_trip_preserves_the_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let store = sample();
        store.save(&path).unwrap();
        let loaded = Store::load(&path).unwrap();
        assert_eq!(store.peeked_next_id(), loaded.peeked_next_id());
        assert_eq!(store.sources(), loaded.sources());
        assert_eq!(store.elements(), loaded.elements());
    }

    #[test]
    fn round_trip_keeps_ids_allocatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut store = sample();
        let expected = store.next_id();
        store.save(&path).unwrap();
        let mut loaded = Store::load(&path).unwrap();
        // the reloaded store hands out fresh ids past everything persisted
        assert!(loaded.next_id() > expected);
    }

    #[test]
    fn missing_file_is_a_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        assert!(Store::load(&path).is_err());
    }
}
