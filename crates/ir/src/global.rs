//! # IR Global Variables
//!
//! Module-scoped storage cells. A reference to a global (`Constant::Global`)
//! is a pointer to its storage.

use serde::{Deserialize, Serialize};

use crate::{indent_str, Constant, Linkage, PrettyPrint, Type};

/// A module-level storage cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,

    /// Type of the stored value
    pub value_type: Type,

    /// Initial contents, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<Constant>,

    /// Explicit alignment; the ABI alignment of `value_type` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<u64>,

    #[serde(default)]
    pub addr_space: u32,

    #[serde(default)]
    pub linkage: Linkage,

    /// True if the contents are never written
    #[serde(default)]
    pub is_constant: bool,
}

impl GlobalVariable {
    /// Creates an internal, mutable global without initializer
    pub fn new(name: impl Into<String>, value_type: Type) -> Self {
        Self {
            name: name.into(),
            value_type,
            initializer: None,
            align: None,
            addr_space: 0,
            linkage: Linkage::Internal,
            is_constant: false,
        }
    }

    /// Sets the initializer
    pub fn with_initializer(mut self, initializer: Constant) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Sets an explicit alignment
    pub const fn with_align(mut self, align: u64) -> Self {
        self.align = Some(align);
        self
    }

    pub const fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Returns the effective alignment in bytes
    pub fn alignment(&self) -> u64 {
        self.align.unwrap_or_else(|| self.value_type.abi_align())
    }
}

impl PrettyPrint for GlobalVariable {
    fn pretty_print(&self, indent: usize) -> String {
        let linkage = match self.linkage {
            Linkage::External => "",
            Linkage::Internal => "internal ",
        };
        let kind = if self.is_constant { "constant" } else { "global" };
        let addr_space = if self.addr_space == 0 {
            String::new()
        } else {
            format!("addrspace({}) ", self.addr_space)
        };
        let init = match &self.initializer {
            Some(init) => format!(" {init}"),
            None => format!(" {} external", self.value_type),
        };
        format!(
            "{}@{} = {linkage}{addr_space}{kind}{init}, align {}",
            indent_str(indent),
            self.name,
            self.alignment()
        )
    }
}
