use xxhash_rust::xxh3::xxh3_64;

/// Rewrite strategy chosen for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlanKind {
    PassSelect,
    InsertPk,
    InsertMulti,
    InsertSubquery,
    UpsertPk,
    DmlPk,
    DmlSubquery,
    Passthrough,
}

impl PlanKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PassSelect => "PASS_SELECT",
            Self::InsertPk => "INSERT_PK",
            Self::InsertMulti => "INSERT_MULTI",
            Self::InsertSubquery => "INSERT_SUBQUERY",
            Self::UpsertPk => "UPSERT_PK",
            Self::DmlPk => "DML_PK",
            Self::DmlSubquery => "DML_SUBQUERY",
            Self::Passthrough => "PASSTHROUGH",
        }
    }
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Groups statements that differ only in literal values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanSignature {
    pub kind: PlanKind,
    pub tables: Vec<String>,
    pub fingerprint: u64,
}

impl PlanSignature {
    /// `shape` is the statement text with every literal and bind replaced by `?`.
    pub fn new(kind: PlanKind, tables: Vec<String>, shape: &str) -> Self {
        Self {
            kind,
            tables,
            fingerprint: xxh3_64(shape.as_bytes()),
        }
    }
}

impl std::fmt::Display for PlanSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{:016x}",
            self.kind,
            self.tables.join(","),
            self.fingerprint
        )
    }
}

/// Everything the rewriter decided for one statement, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct RewritePlan {
    pub kind: PlanKind,
    pub signature: PlanSignature,
    /// Zero-row metadata query, for selects only.
    pub field_query: Option<String>,
    pub statements: Vec<String>,
    /// Overrides the executor's reported count when set.
    pub rows_affected: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::{PlanKind, PlanSignature};

    #[test]
    fn literal_free_shapes_share_a_fingerprint() {
        let first = PlanSignature::new(
            PlanKind::DmlPk,
            vec!["t".to_string()],
            "DELETE FROM t WHERE id = ?",
        );
        let second = PlanSignature::new(
            PlanKind::DmlPk,
            vec!["t".to_string()],
            "DELETE FROM t WHERE id = ?",
        );
        let other = PlanSignature::new(
            PlanKind::DmlPk,
            vec!["t".to_string()],
            "DELETE FROM t WHERE name = ?",
        );
        assert_eq!(first, second);
        assert_ne!(first.fingerprint, other.fingerprint);
        assert!(first.to_string().starts_with("DML_PK|t|"));
    }
}
