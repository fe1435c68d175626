//! Cypher function name → SQL rendering (§4.2).
//!
//! Mirrors the teacher's registry-lookup shape for its ClickHouse function
//! translator — a static name→mapping table consulted once per call site —
//! retargeted at SQLite's builtins and the `cg_*` functions registered in
//! [`crate::storage::functions`].

use std::collections::HashMap;

pub struct FunctionMapping {
    pub render: fn(&[String]) -> String,
    pub is_aggregate: bool,
    /// SQL aggregate name used to build a `DISTINCT` call; empty for
    /// non-aggregates.
    pub agg_sql_name: &'static str,
}

pub fn lookup(name: &str) -> Option<&'static FunctionMapping> {
    FUNCTIONS.get(name.to_lowercase().as_str())
}

fn call(fname: &str, args: &[String]) -> String {
    format!("{}({})", fname, args.join(", "))
}

lazy_static::lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, FunctionMapping> = {
        let mut m = HashMap::new();

        m.insert("coalesce", FunctionMapping {
            render: |a| call("COALESCE", a),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("size", FunctionMapping {
            render: |a| format!("cg_size({})", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("head", FunctionMapping {
            render: |a| format!("json_extract({}, '$[0]')", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("last", FunctionMapping {
            render: |a| format!("cg_last({})", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("tail", FunctionMapping {
            render: |a| format!("cg_tail({})", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("keys", FunctionMapping {
            render: |a| format!("cg_keys({})", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("range", FunctionMapping {
            render: |a| {
                if a.len() >= 3 {
                    format!("cg_range({}, {}, {})", a[0], a[1], a[2])
                } else {
                    format!("cg_range({}, {}, 1)", a[0], a[1])
                }
            },
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("toupper", FunctionMapping {
            render: |a| call("UPPER", a),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("tolower", FunctionMapping {
            render: |a| call("LOWER", a),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("trim", FunctionMapping {
            render: |a| call("TRIM", a),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("substring", FunctionMapping {
            // Cypher's substring() is 0-indexed; SQLite's SUBSTR is 1-indexed.
            render: |a| {
                if a.len() >= 3 {
                    format!("SUBSTR({}, ({}) + 1, {})", a[0], a[1], a[2])
                } else {
                    format!("SUBSTR({}, ({}) + 1)", a[0], a[1])
                }
            },
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("replace", FunctionMapping {
            render: |a| call("REPLACE", a),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("tostring", FunctionMapping {
            render: |a| format!("CAST({} AS TEXT)", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("split", FunctionMapping {
            render: |a| format!("cg_split({}, {})", a[0], a[1]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("abs", FunctionMapping {
            render: |a| call("ABS", a),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("ceil", FunctionMapping {
            render: |a| format!("cg_ceil({})", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("floor", FunctionMapping {
            render: |a| format!("cg_floor({})", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("round", FunctionMapping {
            render: |a| {
                if a.len() >= 2 {
                    format!("cg_round({}, {})", a[0], a[1])
                } else {
                    format!("cg_round({}, 0)", a[0])
                }
            },
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("rand", FunctionMapping {
            render: |_a| "cg_rand()".to_string(),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("sqrt", FunctionMapping {
            render: |a| format!("cg_sqrt({})", a[0]),
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("date", FunctionMapping {
            render: |a| if a.is_empty() { "date('now')".to_string() } else { format!("date({})", a[0]) },
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("datetime", FunctionMapping {
            render: |a| if a.is_empty() { "datetime('now')".to_string() } else { format!("datetime({})", a[0]) },
            is_aggregate: false,
            agg_sql_name: "",
        });
        m.insert("timestamp", FunctionMapping {
            render: |_a| "(CAST(strftime('%s','now') AS INTEGER) * 1000)".to_string(),
            is_aggregate: false,
            agg_sql_name: "",
        });

        m.insert("count", FunctionMapping {
            render: |a| call("COUNT", a),
            is_aggregate: true,
            agg_sql_name: "COUNT",
        });
        m.insert("sum", FunctionMapping {
            render: |a| call("SUM", a),
            is_aggregate: true,
            agg_sql_name: "SUM",
        });
        m.insert("avg", FunctionMapping {
            render: |a| call("AVG", a),
            is_aggregate: true,
            agg_sql_name: "AVG",
        });
        m.insert("min", FunctionMapping {
            render: |a| call("MIN", a),
            is_aggregate: true,
            agg_sql_name: "MIN",
        });
        m.insert("max", FunctionMapping {
            render: |a| call("MAX", a),
            is_aggregate: true,
            agg_sql_name: "MAX",
        });
        m.insert("collect", FunctionMapping {
            render: |a| format!("json_group_array({})", a[0]),
            is_aggregate: true,
            agg_sql_name: "json_group_array",
        });

        m
    };
}
