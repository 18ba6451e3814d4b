use std::fmt;

use db_logging::{db_debug, db_warn};

use crate::value::{is_nil, values_equal, Record, Value};
use crate::StoreError;

/// Points in the insert pipeline where hooks run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePoint {
    BeforeDefaults,
    BeforeInsert,
    AfterInsert,
}

/// Normalizes raw input before defaults are filled.
pub type BeforeDefaultsHook<C> =
    Box<dyn Fn(&KeyedCollection<C>, &C, Record) -> Result<Record, StoreError>>;

/// Transforms the defaulted record; receives the stored record sharing its key, if any.
pub type BeforeInsertHook<C> =
    Box<dyn Fn(&KeyedCollection<C>, &C, Record, Option<&Record>) -> Result<Record, StoreError>>;

/// Side effect on the record that was just stored.
pub type AfterInsertHook<C> =
    Box<dyn Fn(&KeyedCollection<C>, &mut C, &Record) -> Result<(), StoreError>>;

/// Value used for a field missing from an inserted record.
pub enum FieldDefault<C> {
    /// Filled only when the field is missing; an explicit `null` is kept.
    Static(Value),
    /// Computed when the field is missing or `null`.
    Computed(Box<dyn Fn(&KeyedCollection<C>, &C, &Record) -> Value>),
}

impl<C> FieldDefault<C> {
    pub fn computed(f: impl Fn(&KeyedCollection<C>, &C, &Record) -> Value + 'static) -> Self {
        FieldDefault::Computed(Box::new(f))
    }
}

impl<C> fmt::Debug for FieldDefault<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Static(value) => f.debug_tuple("Static").field(value).finish(),
            FieldDefault::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Ordered records unique by a composite key, with defaults and insert hooks.
///
/// `C` is the context handed to defaults and hooks on every insert. It
/// carries whatever state the owner wants hooks to read (or, for
/// `AfterInsert`, mutate) without the collection holding a reference to it.
pub struct KeyedCollection<C> {
    name: String,
    keys: Vec<String>,
    defaults: Vec<(String, FieldDefault<C>)>,
    items: Vec<Record>,
    before_defaults: Vec<BeforeDefaultsHook<C>>,
    before_insert: Vec<BeforeInsertHook<C>>,
    after_insert: Vec<AfterInsertHook<C>>,
}

impl<C> KeyedCollection<C> {
    pub fn new<I, S>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            defaults: Vec::new(),
            items: Vec::new(),
            before_defaults: Vec::new(),
            before_insert: Vec::new(),
            after_insert: Vec::new(),
        }
    }

    /// Registers a default; defaults are applied in registration order.
    pub fn with_default(mut self, field: impl Into<String>, default: FieldDefault<C>) -> Self {
        let field = field.into();
        self.defaults.retain(|(existing, _)| *existing != field);
        self.defaults.push((field, default));
        self
    }

    pub fn on_before_defaults(
        mut self,
        hook: impl Fn(&KeyedCollection<C>, &C, Record) -> Result<Record, StoreError> + 'static,
    ) -> Self {
        self.before_defaults.push(Box::new(hook));
        self
    }

    pub fn on_before_insert(
        mut self,
        hook: impl Fn(&KeyedCollection<C>, &C, Record, Option<&Record>) -> Result<Record, StoreError>
            + 'static,
    ) -> Self {
        self.before_insert.push(Box::new(hook));
        self
    }

    pub fn on_after_insert(
        mut self,
        hook: impl Fn(&KeyedCollection<C>, &mut C, &Record) -> Result<(), StoreError> + 'static,
    ) -> Self {
        self.after_insert.push(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn hook_count(&self, point: LifecyclePoint) -> usize {
        match point {
            LifecyclePoint::BeforeDefaults => self.before_defaults.len(),
            LifecyclePoint::BeforeInsert => self.before_insert.len(),
            LifecyclePoint::AfterInsert => self.after_insert.len(),
        }
    }

    pub fn default_for(&self, field: &str) -> Option<&FieldDefault<C>> {
        self.defaults
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, default)| default)
    }

    /// The static default of `field`, if it has one.
    pub fn static_default(&self, field: &str) -> Option<&Value> {
        match self.default_for(field)? {
            FieldDefault::Static(value) => Some(value),
            FieldDefault::Computed(_) => None,
        }
    }

    /// Runs the insert pipeline and stores the result, replacing any record
    /// with the same key in place.
    ///
    /// Nothing is stored if a hook fails.
    pub fn insert(&mut self, raw: Record, ctx: &mut C) -> Result<&Record, StoreError> {
        let mut item = raw;
        for hook in &self.before_defaults {
            item = hook(&*self, &*ctx, item)?;
        }

        self.apply_defaults(&mut item, &*ctx);

        let matched = self.position_of(&item);
        for hook in &self.before_insert {
            let existing = matched.map(|index| &self.items[index]);
            item = hook(&*self, &*ctx, item, existing)?;
        }

        let (index, previous) = match self.position_of(&item) {
            Some(index) => (index, Some(std::mem::replace(&mut self.items[index], item))),
            None => {
                self.items.push(item);
                (self.items.len() - 1, None)
            }
        };
        db_debug!(
            "{}: {} record at index {}",
            self.name,
            if previous.is_some() { "replaced" } else { "appended" },
            index
        );

        if let Err(err) = self.run_after_insert(index, ctx) {
            db_warn!("{}: rolling back record at index {}: {}", self.name, index, err);
            match previous {
                Some(previous) => self.items[index] = previous,
                None => {
                    self.items.remove(index);
                }
            }
            return Err(err);
        }
        Ok(&self.items[index])
    }

    fn apply_defaults(&self, item: &mut Record, ctx: &C) {
        for (field, default) in &self.defaults {
            match default {
                FieldDefault::Static(value) => {
                    if !item.contains_key(field) {
                        item.insert(field.clone(), value.clone());
                    }
                }
                FieldDefault::Computed(generate) => {
                    if is_nil(item.get(field)) {
                        let value = generate(self, ctx, &*item);
                        item.insert(field.clone(), value);
                    }
                }
            }
        }
    }

    fn run_after_insert(&self, index: usize, ctx: &mut C) -> Result<(), StoreError> {
        let stored = &self.items[index];
        for hook in &self.after_insert {
            hook(self, &mut *ctx, stored)?;
        }
        Ok(())
    }

    /// Index of the record whose key fields equal those of `criteria`.
    ///
    /// Criteria with a missing or `null` key field never match.
    pub fn position_of(&self, criteria: &Record) -> Option<usize> {
        let mut wanted = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            match criteria.get(key) {
                None | Some(Value::Null) => return None,
                Some(value) => wanted.push((key, value)),
            }
        }
        self.items.iter().position(|item| {
            wanted
                .iter()
                .all(|(key, value)| item.get(*key).is_some_and(|v| values_equal(v, value)))
        })
    }

    pub fn find_match(&self, criteria: &Record) -> Option<&Record> {
        self.position_of(criteria).map(|index| &self.items[index])
    }

    pub fn find_match_mut(&mut self, criteria: &Record) -> Option<&mut Record> {
        let index = self.position_of(criteria)?;
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&Record> {
        self.items.last()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.items.get(index)
    }

    /// Direct field access; callers must not break key uniqueness.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.items.get_mut(index)
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<'a, C> IntoIterator for &'a KeyedCollection<C> {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<C> fmt::Debug for KeyedCollection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCollection")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("defaults", &self.defaults)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}
