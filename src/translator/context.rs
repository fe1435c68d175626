//! Per-query variable registry (§4.2, §9): a plain ordered map from bound
//! name to `{kind, addr}`. Strictly query-local — no global state survives
//! between calls.

use std::collections::HashMap;

use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Node,
    Edge,
    Scalar,
}

/// How a bound variable's columns are reached in the SQL being built.
#[derive(Debug, Clone)]
pub enum Addr {
    /// A real `FROM`-item table alias (`n0`, `e0`, or a variable-length
    /// path's CTE name); columns are `{alias}.id`, `{alias}.label`/`.type`,
    /// `{alias}.properties`.
    TableAlias(String),
    /// A node or edge carried across a `WITH` pipeline boundary as three
    /// separately projected columns on the wrapping derived table.
    ColumnPrefix { table: String, prefix: String },
    /// A plain scalar column reference (an `UNWIND` binding, or a
    /// non-entity `WITH` projection).
    Scalar(String),
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub kind: VarKind,
    pub addr: Addr,
}

impl VarInfo {
    pub fn id_sql(&self) -> Option<String> {
        match &self.addr {
            Addr::TableAlias(a) => Some(format!("{a}.id")),
            Addr::ColumnPrefix { table, prefix } => Some(format!("{table}.{prefix}__id")),
            Addr::Scalar(_) => None,
        }
    }

    /// `label` for a node, `type` for an edge.
    pub fn label_or_type_sql(&self) -> Option<String> {
        let field = if self.kind == VarKind::Edge { "type" } else { "label" };
        match &self.addr {
            Addr::TableAlias(a) => Some(format!("{a}.{field}")),
            Addr::ColumnPrefix { table, prefix } => Some(format!("{table}.{prefix}__{field}")),
            Addr::Scalar(_) => None,
        }
    }

    pub fn properties_sql(&self) -> Option<String> {
        match &self.addr {
            Addr::TableAlias(a) => Some(format!("{a}.properties")),
            Addr::ColumnPrefix { table, prefix } => Some(format!("{table}.{prefix}__properties")),
            Addr::Scalar(_) => None,
        }
    }

    pub fn scalar_sql(&self) -> Option<String> {
        match &self.addr {
            Addr::Scalar(sql) => Some(sql.clone()),
            _ => None,
        }
    }

    /// The table alias a pattern join needs to reference this variable's
    /// own row (only meaningful for freshly-bound `MATCH`/`CREATE` nodes
    /// and edges, never for a `WITH`-carried or scalar variable).
    pub fn table_alias(&self) -> Option<&str> {
        match &self.addr {
            Addr::TableAlias(a) => Some(a.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TranslationContext {
    vars: HashMap<String, VarInfo>,
    order: Vec<String>,
    node_counter: usize,
    edge_counter: usize,
    cte_counter: usize,
    with_counter: usize,
}

impl TranslationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to a fresh table alias of `kind`, or returns its
    /// existing binding if the pattern chain already referenced it (e.g. a
    /// relationship target reused as the next hop's source).
    pub fn bind(&mut self, name: &str, kind: VarKind) -> String {
        if let Some(info) = self.vars.get(name) {
            if let Some(alias) = info.table_alias() {
                return alias.to_string();
            }
        }
        let alias = self.fresh_alias(kind);
        self.register(name, kind, Addr::TableAlias(alias.clone()));
        alias
    }

    /// Binds an optionally-named pattern element: `Some(name)` goes through
    /// the named registry, `None` (an anonymous node/edge in the pattern,
    /// e.g. `()-[:R]->()`) always gets a fresh alias no later clause can
    /// address by name.
    pub fn bind_optional(&mut self, name: Option<&str>, kind: VarKind) -> String {
        match name {
            Some(n) => self.bind(n, kind),
            None => self.fresh_alias(kind),
        }
    }

    /// Registers a plain scalar binding (an `UNWIND` alias, or a `WITH`
    /// projection that isn't a bare node/edge).
    pub fn bind_scalar(&mut self, name: &str, sql: impl Into<String>) {
        self.register(name, VarKind::Scalar, Addr::Scalar(sql.into()));
    }

    /// Registers a node/edge carried through a `WITH` boundary as
    /// `{table}.{name}__id` / `__label`|`__type` / `__properties` columns.
    pub fn bind_carried_entity(&mut self, name: &str, kind: VarKind, table: impl Into<String>) {
        self.register(
            name,
            kind,
            Addr::ColumnPrefix {
                table: table.into(),
                prefix: name.to_string(),
            },
        );
    }

    fn register(&mut self, name: &str, kind: VarKind, addr: Addr) {
        if !self.vars.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.vars.insert(name.to_string(), VarInfo { kind, addr });
    }

    pub fn fresh_alias(&mut self, kind: VarKind) -> String {
        match kind {
            VarKind::Node => {
                let a = format!("n{}", self.node_counter);
                self.node_counter += 1;
                a
            }
            VarKind::Edge => {
                let a = format!("e{}", self.edge_counter);
                self.edge_counter += 1;
                a
            }
            VarKind::Scalar => {
                let a = format!("s{}", self.node_counter + self.edge_counter);
                self.node_counter += 1;
                a
            }
        }
    }

    pub fn fresh_cte_name(&mut self) -> String {
        let name = format!("vlen{}", self.cte_counter);
        self.cte_counter += 1;
        name
    }

    pub fn fresh_with_alias(&mut self) -> String {
        let name = format!("w{}", self.with_counter);
        self.with_counter += 1;
        name
    }

    pub fn lookup(&self, name: &str) -> Option<&VarInfo> {
        self.vars.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    /// Drops every binding not named in `names` — `WITH` re-scopes the
    /// query to only the variables it explicitly projects (§4.2).
    pub fn retain_only(&mut self, names: &std::collections::HashSet<String>) {
        self.vars.retain(|name, _| names.contains(name));
        self.order.retain(|name| names.contains(name));
    }
}

/// Bundles the per-query variable registry with the query's bound parameter
/// map, which every expression/condition renderer needs to resolve `$name`
/// references into positional SQL parameters.
pub struct Scope<'a> {
    pub vars: &'a TranslationContext,
    pub params: &'a Map<String, Json>,
}

impl<'a> Scope<'a> {
    pub fn new(vars: &'a TranslationContext, params: &'a Map<String, Json>) -> Self {
        Scope { vars, params }
    }
}
