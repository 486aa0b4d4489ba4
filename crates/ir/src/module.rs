//! # IR Module
//!
//! The top-level container: functions, global variables and the designated
//! entry function.

use index_vec::IndexVec;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    indent_str, Constant, Function, FunctionId, GlobalId, GlobalVariable, PrettyPrint, Value,
};

/// A whole program unit
///
/// Functions and globals are stored in slot arenas. Erasing an entity empties
/// its slot, so ids handed out earlier stay valid for the survivors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ModuleData")]
pub struct Module {
    pub name: String,

    /// All functions, indexed by `FunctionId`; `None` marks an erased slot
    pub functions: IndexVec<FunctionId, Option<Function>>,

    /// All global variables, indexed by `GlobalId`; `None` marks an erased slot
    pub globals: IndexVec<GlobalId, Option<GlobalVariable>>,

    /// The designated entry (root) function, if the producer named one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<FunctionId>,

    /// Name lookup for live functions
    #[serde(skip)]
    pub function_names: FxHashMap<String, FunctionId>,

    /// Name lookup for live globals
    #[serde(skip)]
    pub global_names: FxHashMap<String, GlobalId>,
}

/// Serialized shape of a module; name tables are rebuilt on load
#[derive(Deserialize)]
struct ModuleData {
    name: String,
    functions: IndexVec<FunctionId, Option<Function>>,
    globals: IndexVec<GlobalId, Option<GlobalVariable>>,
    #[serde(default)]
    entry: Option<FunctionId>,
}

impl From<ModuleData> for Module {
    fn from(data: ModuleData) -> Self {
        let mut module = Self {
            name: data.name,
            functions: data.functions,
            globals: data.globals,
            entry: data.entry,
            function_names: FxHashMap::default(),
            global_names: FxHashMap::default(),
        };
        module.rebuild_name_tables();
        module
    }
}

impl Module {
    /// Creates a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexVec::new(),
            globals: IndexVec::new(),
            entry: None,
            function_names: FxHashMap::default(),
            global_names: FxHashMap::default(),
        }
    }

    /// Recomputes the name tables from the arenas
    ///
    /// On duplicate names the first entity wins.
    pub fn rebuild_name_tables(&mut self) {
        self.function_names.clear();
        self.global_names.clear();
        for (id, slot) in self.functions.iter_enumerated() {
            if let Some(function) = slot {
                self.function_names.entry(function.name.clone()).or_insert(id);
            }
        }
        for (id, slot) in self.globals.iter_enumerated() {
            if let Some(global) = slot {
                self.global_names.entry(global.name.clone()).or_insert(id);
            }
        }
    }

    /// Adds a function and returns its id
    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let name = function.name.clone();
        let id = self.functions.push(Some(function));
        self.function_names.entry(name).or_insert(id);
        id
    }

    /// Adds a global variable and returns its id
    pub fn add_global(&mut self, global: GlobalVariable) -> GlobalId {
        let name = global.name.clone();
        let id = self.globals.push(Some(global));
        self.global_names.entry(name).or_insert(id);
        id
    }

    pub fn set_entry(&mut self, entry: FunctionId) {
        self.entry = Some(entry);
    }

    pub fn get_function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id).and_then(Option::as_ref)
    }

    pub fn get_function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.get_mut(id).and_then(Option::as_mut)
    }

    pub fn get_global(&self, id: GlobalId) -> Option<&GlobalVariable> {
        self.globals.get(id).and_then(Option::as_ref)
    }

    pub fn get_global_mut(&mut self, id: GlobalId) -> Option<&mut GlobalVariable> {
        self.globals.get_mut(id).and_then(Option::as_mut)
    }

    pub fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        self.function_names.get(name).copied()
    }

    pub fn lookup_global(&self, name: &str) -> Option<GlobalId> {
        self.global_names.get(name).copied()
    }

    /// Name of a live function, or a placeholder for an erased slot
    pub fn function_name(&self, id: FunctionId) -> &str {
        self.get_function(id).map_or("<erased>", |f| f.name.as_str())
    }

    /// Returns an iterator over all live functions
    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions
            .iter_enumerated()
            .filter_map(|(id, slot)| slot.as_ref().map(|f| (id, f)))
    }

    /// Returns an iterator over all live globals
    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &GlobalVariable)> {
        self.globals
            .iter_enumerated()
            .filter_map(|(id, slot)| slot.as_ref().map(|g| (id, g)))
    }

    /// Ids of all live functions, in id order
    pub fn function_ids(&self) -> Vec<FunctionId> {
        self.functions().map(|(id, _)| id).collect()
    }

    /// Ids of all live globals, in id order
    pub fn global_ids(&self) -> Vec<GlobalId> {
        self.globals().map(|(id, _)| id).collect()
    }

    /// Ids of all live functions that have a body
    pub fn defined_functions(&self) -> Vec<FunctionId> {
        self.functions()
            .filter(|(_, f)| !f.is_declaration())
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of live functions
    pub fn function_count(&self) -> usize {
        self.functions().count()
    }

    /// Number of live globals
    pub fn global_count(&self) -> usize {
        self.globals().count()
    }

    /// Removes a function from the module
    ///
    /// Uses of the function elsewhere are left untouched; see
    /// [`Module::replace_function_uses`].
    pub fn erase_function(&mut self, id: FunctionId) -> Option<Function> {
        let function = self.functions.get_mut(id)?.take()?;
        if self.function_names.get(&function.name) == Some(&id) {
            self.function_names.remove(&function.name);
        }
        if self.entry == Some(id) {
            self.entry = None;
        }
        Some(function)
    }

    /// Removes a global from the module
    pub fn erase_global(&mut self, id: GlobalId) -> Option<GlobalVariable> {
        let global = self.globals.get_mut(id)?.take()?;
        if self.global_names.get(&global.name) == Some(&id) {
            self.global_names.remove(&global.name);
        }
        Some(global)
    }

    /// Replaces every reference to `function` with `replacement`
    ///
    /// Reaches operands of every live function, including constants nested in
    /// aggregates and expressions, and every global initializer. Returns the
    /// number of references replaced.
    pub fn replace_function_uses(&mut self, function: FunctionId, replacement: &Constant) -> usize {
        let mut replaced = 0;
        for f in self.functions.iter_mut().flatten() {
            f.for_each_operand_mut(|operand| {
                if let Value::Constant(c) = operand {
                    replaced += c.replace_function(function, replacement);
                }
            });
        }
        for global in self.globals.iter_mut().flatten() {
            if let Some(init) = &mut global.initializer {
                replaced += init.replace_function(function, replacement);
            }
        }
        replaced
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new("module")
    }
}

impl PrettyPrint for Module {
    fn pretty_print(&self, indent: usize) -> String {
        let mut result = String::new();
        let base_indent = indent_str(indent);

        result.push_str(&format!("{base_indent}; module {}\n", self.name));
        if let Some(entry) = self.entry {
            result.push_str(&format!(
                "{base_indent}; entry @{}\n",
                self.function_name(entry)
            ));
        }

        for (global_id, global) in self.globals() {
            result.push_str(&format!(
                "{} ; g{}\n",
                global.pretty_print(indent),
                global_id.index()
            ));
        }

        for (func_id, function) in self.functions() {
            result.push('\n');
            result.push_str(&format!("{base_indent}; f{}\n", func_id.index()));
            result.push_str(&function.pretty_print(indent));
        }

        result
    }
}
