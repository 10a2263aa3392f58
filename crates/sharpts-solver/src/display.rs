//! Rendering types for diagnostics.

use crate::TypeInterner;
use crate::types::*;

const MAX_DEPTH: u32 = 6;

/// Render a type the way it would appear in an error message.
pub fn type_to_string(interner: &TypeInterner, ty: TypeId) -> String {
    render(interner, ty, 0)
}

fn render(interner: &TypeInterner, ty: TypeId, depth: u32) -> String {
    if depth > MAX_DEPTH {
        return "...".to_string();
    }
    match interner.lookup(ty) {
        TypeKey::Any => "any".into(),
        TypeKey::Unknown => "unknown".into(),
        TypeKey::Never => "never".into(),
        TypeKey::Error => "error".into(),
        TypeKey::Number => "number".into(),
        TypeKey::String => "string".into(),
        TypeKey::Boolean => "boolean".into(),
        TypeKey::Symbol => "symbol".into(),
        TypeKey::BigInt => "bigint".into(),
        TypeKey::Void => "void".into(),
        TypeKey::Null => "null".into(),
        TypeKey::Undefined => "undefined".into(),
        TypeKey::StringLiteral(s) => format!("\"{s}\""),
        TypeKey::NumberLiteral(bits) => sharpts_common::numeric::format_number(bits.as_f64()),
        TypeKey::BooleanLiteral(b) => b.to_string(),
        TypeKey::Array(element) => {
            let inner = render(interner, element, depth + 1);
            if inner.contains('|') || inner.contains('&') {
                format!("({inner})[]")
            } else {
                format!("{inner}[]")
            }
        }
        TypeKey::Tuple(tuple) => {
            let parts: Vec<String> = tuple
                .elements
                .iter()
                .map(|e| {
                    let mut s = String::new();
                    if e.rest {
                        s.push_str("...");
                    }
                    s.push_str(&render(interner, e.type_id, depth + 1));
                    if e.optional {
                        s.push('?');
                    }
                    s
                })
                .collect();
            format!("[{}]", parts.join(", "))
        }
        TypeKey::Record(record) => {
            if record.fields.is_empty()
                && record.indexes.string_index.is_none()
                && record.indexes.number_index.is_none()
            {
                return "{}".to_string();
            }
            let mut parts: Vec<String> = record
                .fields
                .iter()
                .map(|(name, prop)| {
                    format!(
                        "{}{}{}: {}",
                        if prop.readonly { "readonly " } else { "" },
                        name,
                        if prop.optional { "?" } else { "" },
                        render(interner, prop.ty, depth + 1)
                    )
                })
                .collect();
            if let Some(index) = record.indexes.string_index {
                parts.push(format!("[key: string]: {}", render(interner, index, depth + 1)));
            }
            if let Some(index) = record.indexes.number_index {
                parts.push(format!("[key: number]: {}", render(interner, index, depth + 1)));
            }
            format!("{{ {} }}", parts.join("; "))
        }
        TypeKey::Interface(interface) => interface.name,
        TypeKey::Class(class) => format!("typeof {}", class.name),
        TypeKey::Instance(target) => match interner.lookup(target) {
            TypeKey::Class(class) => class.name,
            TypeKey::InstantiatedGeneric { def, args } => {
                let name = match interner.lookup(def) {
                    TypeKey::Class(class) => class.name,
                    TypeKey::Interface(interface) => interface.name,
                    _ => "?".into(),
                };
                let rendered: Vec<String> =
                    args.iter().map(|&a| render(interner, a, depth + 1)).collect();
                format!("{}<{}>", name, rendered.join(", "))
            }
            _ => "object".into(),
        },
        TypeKey::Function(function) => {
            let params: Vec<String> = function
                .params
                .iter()
                .map(|p| {
                    format!(
                        "{}{}{}: {}",
                        if p.rest { "..." } else { "" },
                        p.name,
                        if p.optional { "?" } else { "" },
                        render(interner, p.ty, depth + 1)
                    )
                })
                .collect();
            format!(
                "({}) => {}",
                params.join(", "),
                render(interner, function.ret, depth + 1)
            )
        }
        TypeKey::Overloaded(signatures) => {
            let parts: Vec<String> = signatures
                .iter()
                .map(|&s| render(interner, s, depth + 1))
                .collect();
            format!("{{ {} }}", parts.join("; "))
        }
        TypeKey::TypeParameter(info) => info.name,
        TypeKey::Infer(name) => format!("infer {name}"),
        TypeKey::InstantiatedGeneric { def, args } => {
            let name = match interner.lookup(def) {
                TypeKey::Class(class) => class.name,
                TypeKey::Interface(interface) => interface.name,
                _ => "?".into(),
            };
            let rendered: Vec<String> =
                args.iter().map(|&a| render(interner, a, depth + 1)).collect();
            format!("{}<{}>", name, rendered.join(", "))
        }
        TypeKey::Union(members) => {
            let parts: Vec<String> = members
                .iter()
                .map(|&m| render(interner, m, depth + 1))
                .collect();
            parts.join(" | ")
        }
        TypeKey::Intersection(members) => {
            let parts: Vec<String> = members
                .iter()
                .map(|&m| render(interner, m, depth + 1))
                .collect();
            parts.join(" & ")
        }
        TypeKey::KeyOf(source) => format!("keyof {}", render(interner, source, depth + 1)),
        TypeKey::IndexedAccess { object, index } => format!(
            "{}[{}]",
            render(interner, object, depth + 1),
            render(interner, index, depth + 1)
        ),
        TypeKey::Conditional(c) => format!(
            "{} extends {} ? {} : {}",
            render(interner, c.check_type, depth + 1),
            render(interner, c.extends_type, depth + 1),
            render(interner, c.true_type, depth + 1),
            render(interner, c.false_type, depth + 1)
        ),
        TypeKey::Mapped(m) => format!(
            "{{ [{} in {}]: {} }}",
            m.param,
            render(interner, m.constraint, depth + 1),
            render(interner, m.value, depth + 1)
        ),
        TypeKey::TemplateLiteral { quasis, types } => {
            let mut s = String::from("`");
            s.push_str(&quasis[0]);
            for (i, &ty) in types.iter().enumerate() {
                s.push_str("${");
                s.push_str(&render(interner, ty, depth + 1));
                s.push('}');
                s.push_str(&quasis[i + 1]);
            }
            s.push('`');
            s
        }
        TypeKey::Spread(inner) => format!("...{}", render(interner, inner, depth + 1)),
        TypeKey::Promise(inner) => format!("Promise<{}>", render(interner, inner, depth + 1)),
        TypeKey::Enum(e) => e.name,
    }
}
