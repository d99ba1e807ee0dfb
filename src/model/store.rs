use super::cache::Lru;
use super::element::Element;
use crate::BlockNumber;
use crate::ElementId;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// append-only map of everything the rewriter learned about the target:
/// sources, functions, basic blocks, and goal summaries, all addressed by
/// dense element ids. written once at instrumentation time, read-mostly by
/// the fuzzer afterwards.
pub struct Store {
    next_id: ElementId,
    sources: BTreeMap<String, ElementId>,
    elements: BTreeMap<ElementId, Element>,
    cache: Mutex<Lru<(ElementId, BlockNumber), ElementId>>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            next_id: crate::ERROR_ID + 1,
            sources: BTreeMap::new(),
            elements: BTreeMap::new(),
            cache: Mutex::new(Lru::new(crate::LRU_CACHE_SIZE)),
        }
    }
}

// registration
impl Store {
    /// strictly monotonic id source
    pub fn next_id(&mut self) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// idempotent in `path`: a known source returns its prior id
    pub fn add_source(&mut self, path: &str) -> ElementId {
        match self.sources.get(path) {
            Some(id) => *id,
            None => {
                let id = self.next_id();
                self.sources.insert(path.to_string(), id);
                id
            }
        }
    }

    pub(crate) fn sources_mut(&mut self) -> &mut BTreeMap<String, ElementId> {
        &mut self.sources
    }

    pub(crate) fn set_next_id(&mut self, next_id: ElementId) {
        self.next_id = self.next_id.max(next_id);
    }

    /// insert or replace. replacement is legal but worth a trail.
    pub fn add(&mut self, id: ElementId, element: Element) {
        if self.elements.contains_key(&id) {
            log::info!("replacing element #{} with {}", id, element);
        }
        self.next_id = self.next_id.max(id + 1);
        self.elements.insert(id, element);
    }
}

// lookups
impl Store {
    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn sources(&self) -> &BTreeMap<String, ElementId> {
        &self.sources
    }

    pub fn elements(&self) -> &BTreeMap<ElementId, Element> {
        &self.elements
    }

    pub fn peeked_next_id(&self) -> ElementId {
        self.next_id
    }

    /// resolve (function element id, CFG block number) to the block's
    /// element id. the linear scan over the function's blocks hides behind
    /// a bounded LRU so the hot path is a map probe.
    pub fn get_block_element(&self, function: ElementId, block: BlockNumber) -> ElementId {
        let key = (function, block);
        if let Some(found) = self.cache.lock().unwrap().get(&key) {
            return found;
        }
        let resolved = self.resolve_block(function, block);
        self.cache.lock().unwrap().put(key, resolved);
        resolved
    }

    fn resolve_block(&self, function: ElementId, block: BlockNumber) -> ElementId {
        let blocks = match self.elements.get(&function) {
            None => {
                log::info!("unknown function #{}", function);
                return crate::ERROR_ID;
            }
            Some(Element::Function(f)) => &f.blocks,
            Some(other) => {
                log::info!("element #{} is a {}, not a function", function, other.kind_name());
                return crate::ERROR_ID;
            }
        };
        for id in blocks {
            if let Some(Element::Block(b)) = self.elements.get(id) {
                if b.number == block {
                    return *id;
                }
            }
        }
        log::info!("no block {} in function #{}", block, function);
        crate::ERROR_ID
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Store(next_id={}, sources={{", self.next_id)?;
        for (path, id) in &self.sources {
            writeln!(f, "  {} -> #{}", path, id)?;
        }
        writeln!(f, "}}, elements={{")?;
        for element in self.elements.values() {
            writeln!(f, "  {}", element)?;
        }
        write!(f, "}})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::element::BlockElement;
    use crate::model::element::FunctionElement;
    use crate::model::element::OperatorKind;
    use crate::model::element::SourceElement;
    use crate::model::element::SummaryElement;
    use crate::model::element::TypeKind;

    pub fn tiny_store() -> Store {
        let mut store = Store::default();
        let source = store.next_id();
        let function = store.next_id();
        let entry = store.next_id();
        let exit = store.next_id();
        let goal = store.next_id();
        store.add(
            source,
            Element::Source(SourceElement {
                id: source,
                path: "demo.c".into(),
                functions: vec![function],
            }),
        );
        store.add(
            function,
            Element::Function(FunctionElement {
                id: function,
                source,
                name: "main".into(),
                blocks: vec![entry, exit],
            }),
        );
        store.add(
            entry,
            Element::Block(BlockElement {
                id: entry,
                function,
                number: 1,
                predecessors: vec![],
                summaries: vec![],
            }),
        );
        store.add(
            exit,
            Element::Block(BlockElement {
                id: exit,
                function,
                number: 2,
                predecessors: vec![entry],
                summaries: vec![goal],
            }),
        );
        store.add(
            goal,
            Element::Summary(SummaryElement {
                id: goal,
                block: exit,
                op: OperatorKind::PassThrough,
                ty: TypeKind::Buffer,
            }),
        );
        store
    }

    #[test]
    fn ids_are_monotonic() {
        let mut store = Store::default();
        let a = store.next_id();
        let b = store.next_id();
        assert!(b > a);
        assert!(a > crate::ERROR_ID);
    }

    #[test]
    fn add_source_is_idempotent() {
        let mut store = Store::default();
        let first = store.add_source("a.c");
        let again = store.add_source("a.c");
        let other = store.add_source("b.c");
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[test]
    fn block_lookup_resolves_by_cfg_number() {
        let store = tiny_store();
        let entry = store.get_block_element(2, 1);
        let exit = store.get_block_element(2, 2);
        assert_ne!(entry, crate::ERROR_ID);
        assert_ne!(exit, crate::ERROR_ID);
        assert_ne!(entry, exit);
        // second probe comes out of the cache
        assert_eq!(store.get_block_element(2, 1), entry);
    }

    #[test]
    fn block_lookup_tolerates_garbage() {
        let store = tiny_store();
        assert_eq!(store.get_block_element(999, 1), crate::ERROR_ID);
        assert_eq!(store.get_block_element(1, 1), crate::ERROR_ID);
        assert_eq!(store.get_block_element(2, 99), crate::ERROR_ID);
    }

    #[test]
    fn parents_form_a_tree() {
        let store = tiny_store();
        for element in store.elements().values() {
            match element {
                Element::Source(_) => assert_eq!(element.parent(), crate::ERROR_ID),
                _ => assert!(store.get(element.parent()).is_some()),
            }
        }
    }
}
