//! Filter conditions and their compilation to SQL predicates.
//!
//! A [`Condition`] is a tree of field comparisons combined with `AND`, `OR`,
//! and `NOT`. It can be built in code or parsed from the JSON filter DSL:
//!
//! ```json
//! { "age": { "gte": 18, "lt": 65 }, "OR": [ { "name": "Ann" }, { "name": null } ] }
//! ```
//!
//! [`compile`] resolves every field against a [`ModelSpec`] and produces a
//! fully parenthesized [`Predicate`] with `?` placeholders. Operands are
//! encoded with the metadata of the field they are compared against.
//!
//! # Examples
//!
//! ```
//! use quickmodel_core::{Condition, FieldSpec, ModelRegistry, ModelSpec, compile};
//!
//! let person = ModelSpec::new("person")
//!     .field("age", FieldSpec::integer())
//!     .prepare(&ModelRegistry::new())
//!     .unwrap();
//!
//! let adults = Condition::field("age").gte(18).lt(65);
//! let predicate = compile(&adults.into(), &person).unwrap();
//! assert_eq!(predicate.sql, "((age >= ?) AND (age < ?))");
//! assert_eq!(predicate.to_inline_sql(), "((age >= 18) AND (age < 65))");
//! ```

use crate::coerce;
use crate::error::{ModelError, Result};
use crate::model::ModelSpec;
use crate::types::FieldSpec;
use crate::value::{SqlValue, Value};

/// Comparison applied to one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Not,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `LIKE` with the operand used verbatim as the pattern.
    Like,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operator {
    /// Parses an operator key of the filter DSL.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidOperator`] for unrecognized keys.
    pub fn from_key(key: &str) -> Result<Operator> {
        Ok(match key {
            "equals" => Operator::Equals,
            "not" => Operator::Not,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "like" => Operator::Like,
            "contains" => Operator::Contains,
            "startsWith" => Operator::StartsWith,
            "endsWith" => Operator::EndsWith,
            other => return Err(ModelError::InvalidOperator(other.to_string())),
        })
    }

    pub fn key(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Not => "not",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Like => "like",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
        }
    }

    /// Legacy `field__op` suffixes.
    fn from_suffix(suffix: &str) -> Option<Operator> {
        Some(match suffix {
            "gt" => Operator::Gt,
            "ge" => Operator::Gte,
            "lt" => Operator::Lt,
            "le" => Operator::Lte,
            "like" => Operator::Contains,
            "startswith" => Operator::StartsWith,
            "endswith" => Operator::EndsWith,
            _ => return None,
        })
    }

    fn sql(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::Not => "!=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like | Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                "LIKE"
            }
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// Operand of `in` / `notIn`.
    List(Vec<Value>),
}

/// All comparisons applied to one field; they are AND-ed together.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub ops: Vec<(Operator, Operand)>,
}

impl FieldCondition {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ops: Vec::new(),
        }
    }

    pub fn op(mut self, operator: Operator, operand: impl Into<Value>) -> Self {
        self.ops.push((operator, Operand::Value(operand.into())));
        self
    }

    fn list<I, V>(mut self, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.ops.push((operator, Operand::List(values)));
        self
    }

    pub fn equals(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Equals, value)
    }

    pub fn not_equals(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Not, value)
    }

    pub fn is_in<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(Operator::In, values)
    }

    pub fn not_in<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(Operator::NotIn, values)
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Lt, value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Lte, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Gt, value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Gte, value)
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        self.op(Operator::Like, pattern.into())
    }

    pub fn contains(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Contains, value)
    }

    pub fn starts_with(self, value: impl Into<Value>) -> Self {
        self.op(Operator::StartsWith, value)
    }

    pub fn ends_with(self, value: impl Into<Value>) -> Self {
        self.op(Operator::EndsWith, value)
    }

    pub fn is_null(self) -> Self {
        self.op(Operator::Equals, Value::Null)
    }

    pub fn is_not_null(self) -> Self {
        self.op(Operator::Not, Value::Null)
    }
}

/// A filter condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Field(FieldCondition),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// Negation of the conjunction of the children.
    Not(Vec<Condition>),
}

impl From<FieldCondition> for Condition {
    fn from(field: FieldCondition) -> Self {
        Condition::Field(field)
    }
}

impl Condition {
    /// Starts a comparison chain on `field`.
    pub fn field(field: impl Into<String>) -> FieldCondition {
        FieldCondition::new(field)
    }

    /// `field = value`, or `field IS NULL` for [`Value::Null`].
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Condition {
        FieldCondition::new(field).equals(value).into()
    }

    pub fn is_null(field: impl Into<String>) -> Condition {
        FieldCondition::new(field).is_null().into()
    }

    pub fn and<I, C>(children: I) -> Condition
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        Condition::And(children.into_iter().map(Into::into).collect())
    }

    pub fn or<I, C>(children: I) -> Condition
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        Condition::Or(children.into_iter().map(Into::into).collect())
    }

    pub fn not<I, C>(children: I) -> Condition
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        Condition::Not(children.into_iter().map(Into::into).collect())
    }

    /// Conjoins another condition, flattening into an existing `And`.
    pub fn and_also(self, other: impl Into<Condition>) -> Condition {
        match self {
            Condition::And(mut children) => {
                children.push(other.into());
                Condition::And(children)
            }
            first => Condition::And(vec![first, other.into()]),
        }
    }

    /// Parses the JSON filter DSL.
    ///
    /// Objects conjoin their keys (in key order); `AND`, `OR`, and `NOT`
    /// keys take a list of conditions; a top-level list is an implicit
    /// `AND`. A field maps to a scalar (equality), `null` (`IS NULL`), a
    /// list (`IN`), or an object of operator keys. Keys of the form `field__op` use the short
    /// operator suffixes `gt`, `ge`, `lt`, `le`, `like`, `startswith`,
    /// `endswith`, and `null`.
    ///
    /// ```
    /// use quickmodel_core::{Condition, Operator, Operand, Value};
    /// use serde_json::json;
    ///
    /// let condition = Condition::from_json(&json!({"age": {"gte": 18}})).unwrap();
    /// let Condition::Field(field) = condition else { panic!() };
    /// assert_eq!(field.ops, vec![(Operator::Gte, Operand::Value(Value::Integer(18)))]);
    /// ```
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidOperator`] for unknown operator keys and
    /// [`ModelError::InvalidOperand`] for malformed operands.
    pub fn from_json(json: &serde_json::Value) -> Result<Condition> {
        match json {
            serde_json::Value::Array(items) => Ok(Condition::And(
                items.iter().map(Condition::from_json).collect::<Result<_>>()?,
            )),
            serde_json::Value::Object(map) => {
                let mut parts = sorted(map)
                    .into_iter()
                    .map(|(key, value)| parse_entry(key, value))
                    .collect::<Result<Vec<_>>>()?;
                if parts.len() == 1 {
                    Ok(parts.remove(0))
                } else {
                    Ok(Condition::And(parts))
                }
            }
            other => Err(ModelError::InvalidOperand {
                operator: "filter".to_string(),
                reason: format!("expected an object or a list, got {other}"),
            }),
        }
    }
}

fn sorted(map: &serde_json::Map<String, serde_json::Value>) -> Vec<(&str, &serde_json::Value)> {
    let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn parse_children(key: &str, value: &serde_json::Value) -> Result<Vec<Condition>> {
    match value {
        serde_json::Value::Array(items) => items.iter().map(Condition::from_json).collect(),
        other => Err(ModelError::InvalidOperand {
            operator: key.to_string(),
            reason: format!("expected a list of conditions, got {other}"),
        }),
    }
}

fn parse_entry(key: &str, value: &serde_json::Value) -> Result<Condition> {
    match key {
        "AND" => return Ok(Condition::And(parse_children(key, value)?)),
        "OR" => return Ok(Condition::Or(parse_children(key, value)?)),
        "NOT" => return Ok(Condition::Not(parse_children(key, value)?)),
        _ => {}
    }

    if let Some((field, suffix)) = key.rsplit_once("__") {
        if suffix == "null" {
            let is_null = value.as_bool().ok_or_else(|| ModelError::InvalidOperand {
                operator: key.to_string(),
                reason: format!("expected a boolean, got {value}"),
            })?;
            let field = FieldCondition::new(field);
            return Ok(if is_null { field.is_null() } else { field.is_not_null() }.into());
        }
        if let Some(operator) = Operator::from_suffix(suffix) {
            return Ok(FieldCondition::new(field)
                .op(operator, Value::from_json(value))
                .into());
        }
    }

    let field = FieldCondition::new(key);
    match value {
        serde_json::Value::Object(ops) => {
            let mut field = field;
            for (op_key, operand) in sorted(ops) {
                let operator = Operator::from_key(op_key)?;
                let operand = match (operator, operand) {
                    (Operator::In | Operator::NotIn, serde_json::Value::Array(items)) => {
                        Operand::List(items.iter().map(Value::from_json).collect())
                    }
                    (Operator::In | Operator::NotIn, other) => {
                        return Err(ModelError::InvalidOperand {
                            operator: op_key.to_string(),
                            reason: format!("expected a list, got {other}"),
                        });
                    }
                    (_, operand) => Operand::Value(Value::from_json(operand)),
                };
                field.ops.push((operator, operand));
            }
            Ok(field.into())
        }
        serde_json::Value::Array(items) => {
            Ok(field.is_in(items.iter().map(Value::from_json)).into())
        }
        other => Ok(field.equals(Value::from_json(other)).into()),
    }
}

/// Compiled predicate text with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Parenthesized SQL with one `?` per parameter.
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    /// Renders the predicate with every parameter inlined as a literal.
    pub fn to_inline_sql(&self) -> String {
        let mut params = self.params.iter().peekable();
        let mut out = String::with_capacity(self.sql.len());
        for c in self.sql.chars() {
            match params.next_if(|_| c == '?') {
                Some(param) => out.push_str(&param.to_literal()),
                None => out.push(c),
            }
        }
        out
    }
}

/// Compiles a condition against a model.
///
/// # Errors
///
/// [`ModelError::UnknownField`] when a field is not declared on a closed
/// model, [`ModelError::InvalidOperand`] for operands of the wrong shape.
pub fn compile(condition: &Condition, model: &ModelSpec) -> Result<Predicate> {
    let mut builder = SqlBuilder::new(model);
    builder.condition(condition)?;
    Ok(builder.build())
}

struct SqlBuilder<'m> {
    model: &'m ModelSpec,
    sql: String,
    params: Vec<SqlValue>,
}

impl<'m> SqlBuilder<'m> {
    fn new(model: &'m ModelSpec) -> Self {
        Self {
            model,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn build(self) -> Predicate {
        Predicate {
            sql: self.sql,
            params: self.params,
        }
    }

    fn push_sql(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn push_param(&mut self, value: SqlValue) {
        self.sql.push('?');
        self.params.push(value);
    }

    fn condition(&mut self, condition: &Condition) -> Result<()> {
        match condition {
            Condition::Field(field) => self.field(field),
            Condition::And(children) => self.join(children, " AND ", "(1 = 1)"),
            Condition::Or(children) => self.join(children, " OR ", "(1 = 0)"),
            Condition::Not(children) => {
                self.push_sql("(NOT ");
                self.join(children, " AND ", "(1 = 1)")?;
                self.push_sql(")");
                Ok(())
            }
        }
    }

    /// Single children are emitted without an extra group.
    fn join(&mut self, children: &[Condition], separator: &str, empty: &str) -> Result<()> {
        match children {
            [] => self.push_sql(empty),
            [only] => self.condition(only)?,
            _ => {
                self.push_sql("(");
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        self.push_sql(separator);
                    }
                    self.condition(child)?;
                }
                self.push_sql(")");
            }
        }
        Ok(())
    }

    fn field(&mut self, condition: &FieldCondition) -> Result<()> {
        let model = self.model;
        let (column, spec) = model.resolve_column(&condition.field)?;
        match condition.ops.as_slice() {
            [] => self.push_sql("(1 = 1)"),
            [(operator, operand)] => self.comparison(&column, spec, *operator, operand)?,
            ops => {
                self.push_sql("(");
                for (i, (operator, operand)) in ops.iter().enumerate() {
                    if i > 0 {
                        self.push_sql(" AND ");
                    }
                    self.comparison(&column, spec, *operator, operand)?;
                }
                self.push_sql(")");
            }
        }
        Ok(())
    }

    fn comparison(
        &mut self,
        column: &str,
        spec: Option<&FieldSpec>,
        operator: Operator,
        operand: &Operand,
    ) -> Result<()> {
        match (operator, operand) {
            (Operator::In | Operator::NotIn, Operand::List(values)) => {
                if values.is_empty() {
                    let always = if operator == Operator::In { "(1 = 0)" } else { "(1 = 1)" };
                    self.push_sql(always);
                    return Ok(());
                }
                self.push_sql(&format!("({column} {} (", operator.sql()));
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push_sql(", ");
                    }
                    self.push_param(coerce::encode(value, spec));
                }
                self.push_sql("))");
            }
            (Operator::In | Operator::NotIn, Operand::Value(value)) => {
                return Err(invalid_operand(operator, format!("expected a list, got {value:?}")));
            }
            (_, Operand::List(_)) => {
                return Err(invalid_operand(operator, "a list is only valid for in/notIn"));
            }
            (Operator::Equals, Operand::Value(Value::Null)) => {
                self.push_sql(&format!("({column} IS NULL)"));
            }
            (Operator::Not, Operand::Value(Value::Null)) => {
                self.push_sql(&format!("({column} IS NOT NULL)"));
            }
            (_, Operand::Value(Value::Null)) => {
                return Err(invalid_operand(operator, "null is only valid for equals/not"));
            }
            (Operator::Contains | Operator::StartsWith | Operator::EndsWith, Operand::Value(v)) => {
                let text = match v {
                    Value::Text(s) => s.clone(),
                    other => pattern_text(operator, coerce::encode(other, spec))?,
                };
                let pattern = match operator {
                    Operator::Contains => format!("%{text}%"),
                    Operator::StartsWith => format!("{text}%"),
                    _ => format!("%{text}"),
                };
                self.push_sql(&format!("({column} LIKE "));
                self.push_param(SqlValue::Text(pattern));
                self.push_sql(")");
            }
            (_, Operand::Value(value)) => {
                // LIKE patterns are raw text whatever the column type.
                let spec = if operator == Operator::Like { None } else { spec };
                self.push_sql(&format!("({column} {} ", operator.sql()));
                self.push_param(coerce::encode(value, spec));
                self.push_sql(")");
            }
        }
        Ok(())
    }
}

fn pattern_text(operator: Operator, value: SqlValue) -> Result<String> {
    match value {
        SqlValue::Text(s) => Ok(s),
        SqlValue::Integer(i) => Ok(i.to_string()),
        SqlValue::Real(f) => Ok(f.to_string()),
        other => Err(invalid_operand(
            operator,
            format!("cannot match a pattern against {other:?}"),
        )),
    }
}

fn invalid_operand(operator: Operator, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidOperand {
        operator: operator.key().to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelRegistry;
    use serde_json::json;

    fn person() -> ModelSpec {
        ModelSpec::new("person")
            .field("name", FieldSpec::string())
            .field("age", FieldSpec::integer())
            .field("active", FieldSpec::boolean())
            .field("born", FieldSpec::date())
            .prepare(&ModelRegistry::new())
            .unwrap()
    }

    fn sql(filter: serde_json::Value) -> Predicate {
        compile(&Condition::from_json(&filter).unwrap(), &person()).unwrap()
    }

    #[test]
    fn test_range_on_one_field() {
        let predicate = sql(json!({"age": {"gte": 18, "lt": 65}}));
        assert_eq!(predicate.sql, "((age >= ?) AND (age < ?))");
        assert_eq!(
            predicate.params,
            vec![SqlValue::Integer(18), SqlValue::Integer(65)]
        );
    }

    #[test]
    fn test_or_disjunction() {
        let predicate = sql(json!({"OR": [{"age": 1}, {"age": 2}]}));
        assert_eq!(predicate.sql, "((age = ?) OR (age = ?))");
    }

    #[test]
    fn test_not_negates() {
        assert_eq!(sql(json!({"NOT": [{"age": 1}]})).sql, "(NOT (age = ?))");
        assert_eq!(
            sql(json!({"NOT": [{"age": 1}, {"name": "x"}]})).sql,
            "(NOT ((age = ?) AND (name = ?)))"
        );
    }

    #[test]
    fn test_top_level_list_is_and() {
        let predicate = sql(json!([{"age": 1}, {"name": "Ann"}]));
        assert_eq!(predicate.sql, "((age = ?) AND (name = ?))");
    }

    #[test]
    fn test_null_operands() {
        assert_eq!(sql(json!({"name": null})).sql, "(name IS NULL)");
        assert_eq!(sql(json!({"name": {"not": null}})).sql, "(name IS NOT NULL)");
        assert!(sql(json!({"name": null})).params.is_empty());
    }

    #[test]
    fn test_in_list() {
        let predicate = sql(json!({"age": {"in": [1, 2, 3]}}));
        assert_eq!(predicate.sql, "(age IN (?, ?, ?))");
        assert_eq!(sql(json!({"age": {"notIn": []}})).sql, "(1 = 1)");
        assert_eq!(sql(json!({"age": {"in": []}})).sql, "(1 = 0)");
    }

    #[test]
    fn test_in_requires_list() {
        let result = Condition::from_json(&json!({"age": {"in": 3}}));
        assert!(matches!(result, Err(ModelError::InvalidOperand { .. })));
    }

    #[test]
    fn test_pattern_operators() {
        let predicate = sql(json!({"name": {"contains": "an", "startsWith": "A", "endsWith": "n"}}));
        assert_eq!(
            predicate.params,
            vec![
                SqlValue::Text("%an%".into()),
                SqlValue::Text("%n".into()),
                SqlValue::Text("A%".into()),
            ]
        );
        let like = sql(json!({"name": {"like": "A_n"}}));
        assert_eq!(like.sql, "(name LIKE ?)");
        assert_eq!(like.params, vec![SqlValue::Text("A_n".into())]);
    }

    #[test]
    fn test_operands_encoded_by_field_type() {
        let predicate = sql(json!({"active": true, "born": {"gt": "2000-01-01"}}));
        assert_eq!(predicate.to_inline_sql(), "((active = 1) AND (born > '2000-01-01'))");
    }

    #[test]
    fn test_bare_array_is_membership() {
        let predicate = sql(json!({"name": ["a", "b"]}));
        assert_eq!(predicate.sql, "(name IN (?, ?))");
        assert_eq!(
            predicate.params,
            vec![SqlValue::Text("a".into()), SqlValue::Text("b".into())]
        );

        let empty = sql(json!({"name": []}));
        assert_eq!(empty.sql, "(1 = 0)");
    }

    #[test]
    fn test_json_field_text_operands() {
        let docs = ModelSpec::new("doc")
            .field("body", FieldSpec::json())
            .prepare(&ModelRegistry::new())
            .unwrap();
        let compile_json =
            |filter: serde_json::Value| compile(&Condition::from_json(&filter).unwrap(), &docs).unwrap();

        let equal = compile_json(json!({"body": "hello"}));
        assert_eq!(equal.params, vec![SqlValue::Text(r#""hello""#.into())]);
        let contains = compile_json(json!({"body": {"contains": "ell"}}));
        assert_eq!(contains.params, vec![SqlValue::Text("%ell%".into())]);
    }

    #[test]
    fn test_unknown_operator() {
        let result = Condition::from_json(&json!({"age": {"between": [1, 2]}}));
        assert!(matches!(result, Err(ModelError::InvalidOperator(op)) if op == "between"));
    }

    #[test]
    fn test_unknown_field_on_closed_model() {
        let condition = Condition::eq("height", 180);
        assert!(matches!(
            compile(&condition, &person()),
            Err(ModelError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_open_model_passes_through() {
        let view = ModelSpec::introspected("totals", Vec::new());
        let predicate = compile(&Condition::eq("total", 5), &view).unwrap();
        assert_eq!(predicate.to_inline_sql(), "(total = 5)");
    }

    #[test]
    fn test_case_insensitive_field() {
        assert_eq!(sql(json!({"AGE": 3})).sql, "(age = ?)");
    }

    #[test]
    fn test_legacy_suffix_keys() {
        assert_eq!(sql(json!({"age__ge": 18})).sql, "(age >= ?)");
        assert_eq!(sql(json!({"name__like": "nn"})).params, vec![SqlValue::Text("%nn%".into())]);
        assert_eq!(sql(json!({"name__null": true})).sql, "(name IS NULL)");
        assert_eq!(sql(json!({"name__null": false})).sql, "(name IS NOT NULL)");
    }

    #[test]
    fn test_composite_requires_list() {
        let result = Condition::from_json(&json!({"OR": {"age": 1}}));
        assert!(matches!(result, Err(ModelError::InvalidOperand { .. })));
    }

    #[test]
    fn test_empty_composites() {
        let model = person();
        assert_eq!(compile(&Condition::And(vec![]), &model).unwrap().sql, "(1 = 1)");
        assert_eq!(compile(&Condition::Or(vec![]), &model).unwrap().sql, "(1 = 0)");
    }

    #[test]
    fn test_builder_matches_json() {
        let built: Condition = Condition::or([
            Condition::eq("name", "Ann"),
            Condition::field("age").gt(30).into(),
        ]);
        let parsed = Condition::from_json(&json!({"OR": [{"name": "Ann"}, {"age": {"gt": 30}}]}))
            .unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_and_also_flattens() {
        let condition = Condition::eq("age", 1)
            .and_also(Condition::eq("name", "a"))
            .and_also(Condition::is_null("born"));
        let Condition::And(children) = &condition else {
            panic!("expected And");
        };
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn test_inline_sql_quotes_text() {
        let predicate = compile(&Condition::eq("name", "O'Brien"), &person()).unwrap();
        assert_eq!(predicate.to_inline_sql(), "(name = 'O''Brien')");
    }
}
