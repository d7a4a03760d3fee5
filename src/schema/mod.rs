//! Schema reader: the ordered member list of a config type.
//!
//! # Responsibilities
//! - Collect member declarations from [`Configurable::describe`]
//! - Apply member modifiers (rename, ignore, forbid null, custom converter)
//! - Validate custom converters and fall back to the default one on mismatch
//! - Cache the resulting [`Schema`] per type for the process lifetime
//!
//! # Design Decisions
//! - Types declare their members explicitly; each declaration is a getter and
//!   a mutable getter over one field, so there are no callables to skip
//! - Member order is declaration order and drives serialize, deserialize
//!   and Map iteration alike

mod cache;

pub use cache::SchemaCache;

use std::any::TypeId;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::convert::{
    ConversionError, ConverterRef, ConverterRegistry, Convertible, ErasedAdapter, ErasedConverter,
    Owner, Shape, ValueConverter,
};
use crate::value::Value;

/// A type that can be stored in a config file.
pub trait Configurable: Default + Send + Sync + 'static {
    /// Declares the serialized members, in order.
    fn describe(schema: &mut SchemaBuilder<Self>);

    /// Runs once after every completed outermost change transaction.
    fn changed(&self) {}

    /// Runs after the object was reloaded from its file.
    fn on_reload(&mut self) {}
}

/// Typed access to one member of `T`.
pub(crate) trait MemberOps<T>: Send + Sync {
    fn serialize(&self, obj: &T, owner: &Owner) -> Value;

    fn deserialize(&self, obj: &mut T, value: &Value, owner: &Owner) -> Result<(), ConversionError>;

    fn shape(&self) -> Shape;

    fn attach(&self, obj: &mut T, owner: &Owner);
}

struct FieldOps<T, F, G, M> {
    get: G,
    get_mut: M,
    converter: ConverterRef<F>,
    _owner: PhantomData<fn(&T)>,
}

impl<T, F, G, M> MemberOps<T> for FieldOps<T, F, G, M>
where
    F: Convertible,
    G: Fn(&T) -> &F + Send + Sync,
    M: Fn(&mut T) -> &mut F + Send + Sync,
{
    fn serialize(&self, obj: &T, owner: &Owner) -> Value {
        self.converter.to_value((self.get)(obj), owner)
    }

    fn deserialize(&self, obj: &mut T, value: &Value, owner: &Owner) -> Result<(), ConversionError> {
        self.converter.merge_into((self.get_mut)(obj), value, owner)
    }

    fn shape(&self) -> Shape {
        self.converter.shape()
    }

    fn attach(&self, obj: &mut T, owner: &Owner) {
        (self.get_mut)(obj).attach(owner);
    }
}

enum CustomConverter {
    Direct(Arc<dyn ErasedConverter>),
    Named(String),
}

type BuildOps<T> = Box<dyn FnOnce(Option<Arc<dyn ErasedConverter>>) -> Box<dyn MemberOps<T>>>;

/// One member declaration, refined with the modifier methods.
pub struct MemberDecl<T> {
    field: &'static str,
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    nullable: bool,
    nested: bool,
    ignored: bool,
    non_null: bool,
    custom: Option<CustomConverter>,
    build: BuildOps<T>,
}

impl<T> MemberDecl<T> {
    /// Serialized name; defaults to the field name.
    pub fn rename(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Leaves the member out of the schema.
    pub fn ignore(&mut self) -> &mut Self {
        self.ignored = true;
        self
    }

    /// Rejects `Null` for an optional member.
    pub fn non_null(&mut self) -> &mut Self {
        self.non_null = true;
        self
    }

    /// Uses `converter` instead of the default one.
    ///
    /// A converter whose target is not the member type is reported and ignored.
    pub fn converter<C>(&mut self, converter: C) -> &mut Self
    where
        C: ValueConverter,
        C::Target: Send + 'static,
    {
        self.custom = Some(CustomConverter::Direct(Arc::new(converter)));
        self
    }

    /// Uses the converter registered under `name`.
    pub fn converter_named(&mut self, name: impl Into<String>) -> &mut Self {
        self.custom = Some(CustomConverter::Named(name.into()));
        self
    }
}

/// Collects the member declarations of `T`.
pub struct SchemaBuilder<T> {
    decls: Vec<MemberDecl<T>>,
}

impl<T: 'static> SchemaBuilder<T> {
    fn new() -> Self {
        Self { decls: Vec::new() }
    }

    /// Declares a member backed by a field of `T`.
    pub fn field<F, G, M>(&mut self, field: &'static str, get: G, get_mut: M) -> &mut MemberDecl<T>
    where
        F: Convertible,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        let build: BuildOps<T> = Box::new(move |custom| {
            let converter: ConverterRef<F> = match custom.and_then(ErasedAdapter::<F>::new) {
                Some(adapter) => Arc::new(adapter),
                None => F::default_converter(),
            };
            Box::new(FieldOps {
                get,
                get_mut,
                converter,
                _owner: PhantomData,
            })
        });

        self.decls.push(MemberDecl {
            field,
            name: field.to_string(),
            type_id: TypeId::of::<F>(),
            type_name: std::any::type_name::<F>(),
            nullable: F::NULLABLE,
            nested: F::NESTED,
            ignored: false,
            non_null: false,
            custom: None,
            build,
        });
        let last = self.decls.len() - 1;
        &mut self.decls[last]
    }

    fn finish(self, converters: &ConverterRegistry) -> Schema<T> {
        let type_name = std::any::type_name::<T>();
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(self.decls.len());

        for decl in self.decls {
            if decl.ignored {
                continue;
            }
            if !seen.insert(decl.name.clone()) {
                tracing::warn!(
                    config_type = type_name,
                    member = %decl.name,
                    field = decl.field,
                    "Duplicate serialized name, member skipped"
                );
                continue;
            }

            let custom = resolve_custom(type_name, &decl, converters);
            let has_custom = custom.is_some();
            members.push(Member {
                name: decl.name,
                field: decl.field,
                type_name: decl.type_name,
                allow_null: decl.nullable && !decl.non_null,
                nullable_wrapper: decl.nullable,
                nested: decl.nested,
                custom_converter: has_custom,
                ops: (decl.build)(custom),
            });
        }

        if members.is_empty() {
            tracing::warn!(config_type = type_name, "Config type has no serializable members");
        }

        Schema { members }
    }
}

fn resolve_custom<T>(
    type_name: &'static str,
    decl: &MemberDecl<T>,
    converters: &ConverterRegistry,
) -> Option<Arc<dyn ErasedConverter>> {
    let converter = match decl.custom.as_ref()? {
        CustomConverter::Direct(c) => Arc::clone(c),
        CustomConverter::Named(name) => match converters.get(name) {
            Some(c) => c,
            None => {
                tracing::warn!(
                    config_type = type_name,
                    member = %decl.name,
                    converter = %name,
                    "Converter is not constructible, using default converter"
                );
                return None;
            }
        },
    };

    if converter.target_type() != decl.type_id {
        tracing::warn!(
            config_type = type_name,
            member = %decl.name,
            converter_target = converter.target_name(),
            member_type = decl.type_name,
            "Converter target is not the member's type, using default converter"
        );
        return None;
    }
    Some(converter)
}

/// One serialized member of `T`.
pub struct Member<T> {
    pub(crate) name: String,
    field: &'static str,
    type_name: &'static str,
    pub(crate) allow_null: bool,
    nullable_wrapper: bool,
    nested: bool,
    custom_converter: bool,
    pub(crate) ops: Box<dyn MemberOps<T>>,
}

impl<T> Member<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn allow_null(&self) -> bool {
        self.allow_null
    }

    pub fn nullable_wrapper(&self) -> bool {
        self.nullable_wrapper
    }

    pub fn nested(&self) -> bool {
        self.nested
    }

    pub fn has_custom_converter(&self) -> bool {
        self.custom_converter
    }

    pub fn shape(&self) -> Shape {
        self.ops.shape()
    }
}

impl<T> std::fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("allow_null", &self.allow_null)
            .field("nested", &self.nested)
            .field("custom_converter", &self.custom_converter)
            .finish()
    }
}

/// The ordered members of `T`.
pub struct Schema<T> {
    members: Vec<Member<T>>,
}

impl<T: Configurable> Schema<T> {
    pub(crate) fn build(converters: &ConverterRegistry) -> Self {
        let mut builder = SchemaBuilder::new();
        T::describe(&mut builder);
        builder.finish(converters)
    }
}

impl<T> Schema<T> {
    pub fn members(&self) -> &[Member<T>] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Member<T>> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
