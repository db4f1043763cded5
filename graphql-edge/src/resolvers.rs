//! Field resolvers.
//!
//! A [`Resolvers`] registry maps `(type name, field name)` coordinates to
//! functions computing the value of that field. Resolvers return plain JSON:
//! objects are typed by their `__typename` member when they have one and by the
//! field's declared type otherwise, and their fields without a registered
//! resolver are read from the object itself.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::resolvers::AsyncObjectValue;
use apollo_compiler::resolvers::AsyncResolvedValue;
use apollo_compiler::resolvers::FieldError as CompilerFieldError;
use apollo_compiler::resolvers::ResolveInfo;
use displaydoc::Display;
use futures::FutureExt;
use futures::StreamExt;
use futures::future;
use futures::future::BoxFuture;
use http::request::Parts;
use indexmap::Equivalent;
use indexmap::IndexMap;
use thiserror::Error;

use crate::json_ext::Object;
use crate::json_ext::Value;

/// {message}
///
/// An error returned by a resolver. It becomes a field error of the response.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[ignore_extra_doc_attributes]
pub struct FieldError {
    /// The message reported in the response's `errors`.
    pub message: String,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// What a resolver gets to compute the value of a field.
#[non_exhaustive]
pub struct ResolverContext<'a> {
    /// The object the field belongs to. Empty for root fields.
    pub parent: &'a Object,

    /// The field arguments, coerced according to their definitions.
    pub arguments: &'a Object,

    /// The head of the HTTP request being served.
    pub request: &'a Parts,

    /// Details about the field being resolved.
    pub info: &'a ResolveInfo<'a>,
}

impl ResolverContext<'_> {
    pub fn field_name(&self) -> &str {
        self.info.field_name()
    }
}

/// A resolver for a single field.
///
/// The returned future may borrow the context: it is awaited before the
/// field's value is completed.
pub type FieldResolver = Arc<
    dyn for<'a> Fn(ResolverContext<'a>) -> BoxFuture<'a, Result<Value, FieldError>>
        + Send
        + Sync
        + 'static,
>;

/// Borrowed form of a registry key, so lookups do not allocate.
#[derive(Hash)]
struct FieldCoordinate<'a>(&'a str, &'a str);

impl Equivalent<(String, String)> for FieldCoordinate<'_> {
    fn equivalent(&self, (type_name, field_name): &(String, String)) -> bool {
        self.0 == type_name && self.1 == field_name
    }
}

/// A registry of field resolvers.
#[derive(Clone, Default)]
pub struct Resolvers {
    fields: IndexMap<(String, String), FieldResolver>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the resolver of `type_name.field_name`, replacing any previous one.
    ///
    /// ```ignore
    /// Resolvers::new().field("Query", "book", |ctx| {
    ///     Box::pin(async move {
    ///         let id = ctx.arguments.get("id").cloned();
    ///         fetch_book(id).await
    ///     })
    /// })
    /// ```
    pub fn field<F>(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: F,
    ) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> BoxFuture<'a, Result<Value, FieldError>>
            + Send
            + Sync
            + 'static,
    {
        self.insert(type_name, field_name, resolver);
        self
    }

    /// Registers a resolver that computes its value without awaiting anything.
    pub fn sync_field<F>(
        self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: F,
    ) -> Self
    where
        F: Fn(ResolverContext<'_>) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        self.field(type_name, field_name, move |ctx| {
            future::ready(resolver(ctx)).boxed()
        })
    }

    /// Registers the resolver of `type_name.field_name`, replacing any previous one.
    pub fn insert<F>(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: F,
    ) where
        F: for<'a> Fn(ResolverContext<'a>) -> BoxFuture<'a, Result<Value, FieldError>>
            + Send
            + Sync
            + 'static,
    {
        self.fields
            .insert((type_name.into(), field_name.into()), Arc::new(resolver));
    }

    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&FieldResolver> {
        self.fields.get(&FieldCoordinate(type_name, field_name))
    }

    /// The `(type name, field name)` coordinates with a registered resolver, in registration order.
    pub fn coordinates(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .keys()
            .map(|(type_name, field_name)| (type_name.as_str(), field_name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.coordinates()
                    .map(|(type_name, field_name)| format!("{type_name}.{field_name}")),
            )
            .finish()
    }
}

/// An object value seen by the execution engine.
pub(crate) struct ResolvedObject<'a> {
    type_name: String,
    fields: Object,
    resolvers: &'a Resolvers,
    request: &'a Parts,
}

impl<'a> ResolvedObject<'a> {
    /// The initial value of an operation: an empty object of the root type.
    pub(crate) fn root(type_name: &str, resolvers: &'a Resolvers, request: &'a Parts) -> Self {
        Self {
            type_name: type_name.to_string(),
            fields: Object::new(),
            resolvers,
            request,
        }
    }
}

impl AsyncObjectValue for ResolvedObject<'_> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> BoxFuture<'a, Result<AsyncResolvedValue<'a>, CompilerFieldError>> {
        Box::pin(async move {
            let field_name = info.field_name();
            let value = match self.resolvers.get(&self.type_name, field_name) {
                Some(resolver) => resolver(ResolverContext {
                    parent: &self.fields,
                    arguments: info.arguments(),
                    request: self.request,
                    info,
                })
                .await
                .map_err(|error| CompilerFieldError {
                    message: error.message,
                })?,
                None => self.fields.get(field_name).cloned().unwrap_or(Value::Null),
            };
            Ok(resolve_value(value, self.resolvers, self.request, info))
        })
    }
}

fn resolve_value<'a>(
    value: Value,
    resolvers: &'a Resolvers,
    request: &'a Parts,
    info: &'a ResolveInfo<'a>,
) -> AsyncResolvedValue<'a> {
    match value {
        Value::Object(fields) => {
            let type_name = match fields.get("__typename") {
                Some(Value::String(type_name)) => type_name.as_str().to_string(),
                _ => info.field_definition().ty.inner_named_type().to_string(),
            };
            AsyncResolvedValue::object(ResolvedObject {
                type_name,
                fields,
                resolvers,
                request,
            })
        }
        Value::Array(items) => AsyncResolvedValue::List(
            futures::stream::iter(items)
                .map(move |item| {
                    Ok::<_, CompilerFieldError>(resolve_value(item, resolvers, request, info))
                })
                .boxed(),
        ),
        leaf => AsyncResolvedValue::leaf(leaf),
    }
}
