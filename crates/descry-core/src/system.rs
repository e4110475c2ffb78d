//! The System registry: single owner of every Documentable.
//!
//! The System holds the arena, the qname index, re-export aliases, the root
//! packages in processing order, privacy rules, the active external
//! inventory and the resolution cache. It is the only process-wide state
//! and is threaded explicitly through every operation.
//!
//! It is single-writer during the build phase; after post-processing the
//! model is treated as read-only and only the memo caches keep mutating
//! (behind `RefCell`, since the pipeline is single-threaded by design).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::docformat::DocFormat;
use crate::model::{DocId, Documentable, EntityKind, ExternalHit, Resolution};
use crate::privacy::{Privacy, PrivacyRules};
use crate::qname;
use crate::report::{Reporter, TracingReporter, Warning};

// ============================================================================
// External lookup contract
// ============================================================================

/// Lookup of a possibly-qualified name in loaded external inventories.
/// Implemented by the inventory loader; the System only needs the query.
pub trait ExternalLookup {
    /// Longest-prefix match of `name`, or `None`.
    fn lookup(&self, name: &str) -> Option<ExternalHit>;
}

// ============================================================================
// System
// ============================================================================

/// The registry of all Documentables plus build configuration.
pub struct System {
    entities: Vec<Documentable>,
    by_qname: HashMap<String, DocId>,
    /// Former qnames of relocated entities. Keys never collide with
    /// `by_qname`; a relocated entity is reachable through both.
    aliases: BTreeMap<String, DocId>,
    roots: Vec<DocId>,
    privacy_rules: PrivacyRules,
    default_docformat: DocFormat,
    reporter: Rc<dyn Reporter>,
    inventory: Option<Rc<dyn ExternalLookup>>,
    resolve_cache: RefCell<HashMap<(DocId, String), Resolution>>,
    frozen: bool,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    pub fn new() -> Self {
        System {
            entities: Vec::new(),
            by_qname: HashMap::new(),
            aliases: BTreeMap::new(),
            roots: Vec::new(),
            privacy_rules: PrivacyRules::default(),
            default_docformat: DocFormat::Epytext,
            reporter: Rc::new(TracingReporter),
            inventory: None,
            resolve_cache: RefCell::new(HashMap::new()),
            frozen: false,
        }
    }

    pub fn with_reporter(reporter: Rc<dyn Reporter>) -> Self {
        let mut system = Self::new();
        system.reporter = reporter;
        system
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn set_privacy_rules(&mut self, rules: PrivacyRules) {
        self.privacy_rules = rules;
    }

    pub fn privacy_rules(&self) -> &PrivacyRules {
        &self.privacy_rules
    }

    pub fn set_default_docformat(&mut self, format: DocFormat) {
        self.default_docformat = format;
    }

    pub fn default_docformat(&self) -> DocFormat {
        self.default_docformat
    }

    pub fn set_inventory(&mut self, inventory: Rc<dyn ExternalLookup>) {
        self.inventory = Some(inventory);
    }

    /// Query the active external inventory, if any.
    pub fn external_lookup(&self, name: &str) -> Option<ExternalHit> {
        self.inventory.as_ref().and_then(|inv| inv.lookup(name))
    }

    pub fn reporter(&self) -> Rc<dyn Reporter> {
        Rc::clone(&self.reporter)
    }

    pub fn report(&self, warning: Warning) {
        self.reporter.report(warning);
    }

    // ------------------------------------------------------------------
    // Arena access
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: DocId) -> &Documentable {
        &self.entities[id.index()]
    }

    pub fn get_mut(&mut self, id: DocId) -> &mut Documentable {
        debug_assert!(!self.frozen, "mutating a frozen System");
        &mut self.entities[id.index()]
    }

    /// All entities in creation order. This order is deterministic for a
    /// given input set and drives every serialized output.
    pub fn iter(&self) -> impl Iterator<Item = &Documentable> {
        self.entities.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = DocId> + '_ {
        (0..self.entities.len() as u32).map(DocId)
    }

    pub fn roots(&self) -> &[DocId] {
        &self.roots
    }

    // ------------------------------------------------------------------
    // Creation and registration
    // ------------------------------------------------------------------

    /// Create a Documentable under `parent` (or as a root) and register its
    /// qname. A clash on the qname re-points the registry to the new entity
    /// with a warning; callers that want merge semantics check first.
    pub fn add(&mut self, parent: Option<DocId>, name: &str, kind: EntityKind) -> DocId {
        debug_assert!(!self.frozen, "adding to a frozen System");
        let name = if qname::is_valid_segment(name) {
            name.to_string()
        } else {
            // Colons and dots cannot appear in a segment; keep going with a
            // sanitized name rather than dropping the entity.
            let sanitized: String = name
                .chars()
                .map(|c| if c == ':' || c == '.' { '_' } else { c })
                .collect();
            self.report(Warning::new(
                "model",
                format!("invalid name '{name}' sanitized to '{sanitized}'"),
            ));
            sanitized
        };
        let qname = match parent {
            Some(pid) => qname::join(&self.get(pid).qname, &name),
            None => name.clone(),
        };
        let id = DocId(self.entities.len() as u32);
        let doc = Documentable::new(id, name, parent, qname.clone(), kind);
        self.entities.push(doc);
        match parent {
            Some(pid) => self.entities[pid.index()].children.push(id),
            None => self.roots.push(id),
        }
        if let Some(old) = self.by_qname.insert(qname.clone(), id) {
            self.report(Warning::new(
                "model",
                format!("duplicate qualified name '{qname}' (shadows {old})"),
            ));
        }
        id
    }

    /// Look up a qname in the registry, falling back to re-export aliases.
    pub fn lookup(&self, qname: &str) -> Option<DocId> {
        self.by_qname
            .get(qname)
            .or_else(|| self.aliases.get(qname))
            .copied()
    }

    /// Direct child of `id` with the given name. Later children shadow
    /// earlier ones of the same name.
    pub fn child_named(&self, id: DocId, name: &str) -> Option<DocId> {
        self.get(id)
            .children
            .iter()
            .rev()
            .copied()
            .find(|&c| self.get(c).name == name)
    }

    /// Module-like children of a package.
    pub fn submodules(&self, id: DocId) -> Vec<DocId> {
        self.get(id)
            .children
            .iter()
            .copied()
            .filter(|&c| self.get(c).kind.is_module_like())
            .collect()
    }

    /// Nearest enclosing module or package, including `id` itself.
    pub fn module_scope(&self, id: DocId) -> DocId {
        let mut cur = id;
        loop {
            let doc = self.get(cur);
            if doc.kind.is_module_like() {
                return cur;
            }
            match doc.parent {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// The root the entity hangs off.
    pub fn root_of(&self, id: DocId) -> DocId {
        let mut cur = id;
        while let Some(p) = self.get(cur).parent {
            cur = p;
        }
        cur
    }

    // ------------------------------------------------------------------
    // Relocation support
    // ------------------------------------------------------------------

    /// Re-key `id` (and all descendants) to `new_qname`, leaving the old
    /// qnames behind as aliases so both paths keep resolving.
    pub fn set_qname_recursive(&mut self, id: DocId, new_qname: String) {
        debug_assert!(!self.frozen, "relocating in a frozen System");
        let old_qname = self.get(id).qname.clone();
        if old_qname == new_qname {
            return;
        }
        self.by_qname.remove(&old_qname);
        self.aliases.insert(old_qname, id);
        if let Some(shadowed) = self.by_qname.insert(new_qname.clone(), id) {
            if shadowed != id {
                self.report(Warning::new(
                    "model",
                    format!("relocation to '{new_qname}' shadows {shadowed}"),
                ));
            }
        }
        self.entities[id.index()].qname = new_qname.clone();
        let children = self.entities[id.index()].children.clone();
        for child in children {
            let child_name = self.get(child).name.clone();
            self.set_qname_recursive(child, qname::join(&new_qname, &child_name));
        }
    }

    /// Register an extra alias qname for an entity.
    pub fn add_alias(&mut self, alias: String, id: DocId) {
        self.aliases.insert(alias, id);
    }

    pub fn alias_map(&self) -> &BTreeMap<String, DocId> {
        &self.aliases
    }

    // ------------------------------------------------------------------
    // Privacy and docformat
    // ------------------------------------------------------------------

    /// Compute the privacy of an entity from defaults, rules and the
    /// transitive-HIDDEN rule. The post-processor stores the result on the
    /// entity; afterwards read `Documentable::privacy` instead.
    pub fn compute_privacy(&self, id: DocId) -> Privacy {
        let doc = self.get(id);
        let own = self.privacy_rules.classify(&doc.qname, &doc.name);
        if own == Privacy::Hidden {
            return Privacy::Hidden;
        }
        let mut parent = doc.parent;
        while let Some(pid) = parent {
            let pd = self.get(pid);
            if self.privacy_rules.classify(&pd.qname, &pd.name) == Privacy::Hidden {
                return Privacy::Hidden;
            }
            parent = pd.parent;
        }
        own
    }

    /// The active docformat for an entity: the owning module's declaration,
    /// else the nearest enclosing package's, else the system default. A
    /// plaintext system default overrides declarations.
    pub fn docformat(&self, id: DocId) -> DocFormat {
        if self.default_docformat == DocFormat::Plaintext {
            return DocFormat::Plaintext;
        }
        let mut cur = Some(self.module_scope(id));
        while let Some(mid) = cur {
            let doc = self.get(mid);
            if let Some(data) = doc.kind.as_module() {
                if let Some(declared) = &data.declared_docformat {
                    if let Ok(format) = declared.parse::<DocFormat>() {
                        return format;
                    }
                }
            }
            cur = doc.parent;
        }
        self.default_docformat
    }

    // ------------------------------------------------------------------
    // Extension slots
    // ------------------------------------------------------------------

    /// Write an extra-info slot. Two writers hitting the same slot of the
    /// same entity is a programmer error; the later write wins and a
    /// warning records the collision.
    pub fn set_extra(&mut self, id: DocId, key: &str, value: serde_json::Value) {
        let qname = self.get(id).qname.clone();
        let previous = self.entities[id.index()]
            .extra_info
            .insert(key.to_string(), value);
        if previous.is_some() {
            self.report(Warning::new(
                "extension",
                format!("extra-info slot '{key}' on '{qname}' overwritten"),
            ));
        }
    }

    // ------------------------------------------------------------------
    // Resolution cache
    // ------------------------------------------------------------------

    pub fn cached_resolution(&self, ctx: DocId, name: &str) -> Option<Resolution> {
        self.resolve_cache
            .borrow()
            .get(&(ctx, name.to_string()))
            .cloned()
    }

    pub fn cache_resolution(&self, ctx: DocId, name: String, resolution: Resolution) {
        self.resolve_cache
            .borrow_mut()
            .insert((ctx, name), resolution);
    }

    /// Drop all memoized resolutions. Called after re-export relocation
    /// invalidates earlier answers.
    pub fn clear_resolve_cache(&self) {
        self.resolve_cache.borrow_mut().clear();
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Mark the model read-only. Debug builds assert on later mutation.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    // ------------------------------------------------------------------
    // Serialization support
    // ------------------------------------------------------------------

    pub(crate) fn entities(&self) -> &[Documentable] {
        &self.entities
    }

    /// Rebuild a System from deserialized parts. The qname index is
    /// reconstructed; caches start cold.
    pub(crate) fn from_parts(
        entities: Vec<Documentable>,
        roots: Vec<DocId>,
        aliases: BTreeMap<String, DocId>,
        default_docformat: DocFormat,
        reporter: Rc<dyn Reporter>,
    ) -> Self {
        let mut by_qname = HashMap::with_capacity(entities.len());
        for doc in &entities {
            by_qname.insert(doc.qname.clone(), doc.id);
        }
        System {
            entities,
            by_qname,
            aliases,
            roots,
            privacy_rules: PrivacyRules::default(),
            default_docformat,
            reporter,
            inventory: None,
            resolve_cache: RefCell::new(HashMap::new()),
            frozen: true,
        }
    }
}
