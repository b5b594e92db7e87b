use super::engine::IdentityStore;
use super::notify::{NotificationHub, PropChange, SubscriberId, Subscription};
use crate::core::{ClassId, FieldRef, ListError, ObjectId, Result, Value};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    OwningVector,
}

#[derive(Debug, Clone)]
struct StoredObject {
    class: ClassId,
    guid: Uuid,
    owner: Option<(ObjectId, FieldRef)>,
    scalars: HashMap<FieldRef, Value>,
    vectors: HashMap<FieldRef, Vec<ObjectId>>,
}

/// In-memory object graph with owning vectors and change broadcast.
///
/// Every mutation reports itself through the notification hub in the shape
/// the record list expects, so it doubles as the reference store for tests
/// and for embedding applications without a database of their own.
pub struct InMemoryStore {
    objects: HashMap<ObjectId, StoredObject>,
    guids: HashMap<Uuid, ObjectId>,
    fields: HashMap<FieldRef, FieldKind>,
    next_id: u64,
    hub: NotificationHub,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            guids: HashMap::new(),
            fields: HashMap::new(),
            next_id: 1,
            hub: NotificationHub::new(),
        }
    }

    // ========================================================================
    // Schema
    // ========================================================================

    pub fn declare_scalar(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.fields.insert(field.into(), FieldKind::Scalar);
        self
    }

    pub fn declare_vector(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.fields.insert(field.into(), FieldKind::OwningVector);
        self
    }

    /// Removes a field from the schema and from every object
    pub fn drop_field(&mut self, field: &FieldRef) {
        self.fields.remove(field);
        for object in self.objects.values_mut() {
            object.scalars.remove(field);
            object.vectors.remove(field);
        }
    }

    fn field_kind(&self, field: &FieldRef) -> Result<FieldKind> {
        self.fields
            .get(field)
            .copied()
            .ok_or_else(|| ListError::SchemaDrift {
                field: field.clone(),
            })
    }

    fn expect_vector(&self, field: &FieldRef) -> Result<()> {
        match self.field_kind(field)? {
            FieldKind::OwningVector => Ok(()),
            FieldKind::Scalar => Err(ListError::TypeMismatch(format!(
                "'{}' is not an owning vector",
                field
            ))),
        }
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    /// Creates an unowned object
    pub fn create_root(&mut self, class: impl Into<ClassId>) -> ObjectId {
        self.allocate(class.into(), None)
    }

    /// Appends a new object to `owner.field`
    pub fn create_owned(
        &mut self,
        owner: ObjectId,
        field: impl Into<FieldRef>,
        class: impl Into<ClassId>,
    ) -> Result<ObjectId> {
        let field = field.into();
        let index = self.vector_len(owner, &field)?;
        self.insert_owned(owner, field, index, class)
    }

    /// Inserts a new object into `owner.field` at `index`
    pub fn insert_owned(
        &mut self,
        owner: ObjectId,
        field: impl Into<FieldRef>,
        index: usize,
        class: impl Into<ClassId>,
    ) -> Result<ObjectId> {
        let field = field.into();
        let index = index.min(self.vector_len(owner, &field)?);
        let id = self.allocate(class.into(), Some((owner, field.clone())));
        self.owner_vector_mut(owner, &field)?.insert(index, id);
        self.hub.broadcast(PropChange::new(owner, field, index, 1, 0));
        Ok(id)
    }

    fn allocate(&mut self, class: ClassId, owner: Option<(ObjectId, FieldRef)>) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let guid = Uuid::new_v4();
        self.guids.insert(guid, id);
        self.objects.insert(
            id,
            StoredObject {
                class,
                guid,
                owner,
                scalars: HashMap::new(),
                vectors: HashMap::new(),
            },
        );
        id
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    pub fn set_property(
        &mut self,
        id: ObjectId,
        field: impl Into<FieldRef>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let field = field.into();
        if self.field_kind(&field)? != FieldKind::Scalar {
            return Err(ListError::TypeMismatch(format!("'{}' is not a scalar", field)));
        }
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(ListError::UnknownObject(id))?;
        object.scalars.insert(field.clone(), value.into());
        self.hub.broadcast(PropChange::scalar(id, field));
        Ok(())
    }

    /// Deletes `id` and everything it owns
    pub fn delete_object(&mut self, id: ObjectId) -> Result<()> {
        let owner = self
            .objects
            .get(&id)
            .ok_or(ListError::UnknownObject(id))?
            .owner
            .clone();

        let detached_at = match &owner {
            Some((owner_id, field)) => self.detach(*owner_id, field, id),
            None => None,
        };
        self.remove_subtree(id);

        if let (Some((owner_id, field)), Some(index)) = (owner, detached_at) {
            self.hub.broadcast(PropChange::new(owner_id, field, index, 0, 1));
        }
        Ok(())
    }

    /// Deletes the object at `owner.field[index]` and puts a fresh one in its
    /// slot, reported as a single one-in/one-out change
    pub fn replace_owned(
        &mut self,
        owner: ObjectId,
        field: impl Into<FieldRef>,
        index: usize,
        class: impl Into<ClassId>,
    ) -> Result<ObjectId> {
        let field = field.into();
        let old = self
            .vector_property(owner, &field)?
            .get(index)
            .copied()
            .ok_or_else(|| {
                ListError::TypeMismatch(format!("no element {} in {}.{}", index, owner, field))
            })?;
        self.detach(owner, &field, old);
        self.remove_subtree(old);

        let id = self.allocate(class.into(), Some((owner, field.clone())));
        self.owner_vector_mut(owner, &field)?.insert(index, id);
        self.hub.broadcast(PropChange::new(owner, field, index, 1, 1));
        Ok(id)
    }

    /// Deletes every element of `owner.field`, reported as one change
    pub fn clear_vector(&mut self, owner: ObjectId, field: impl Into<FieldRef>) -> Result<usize> {
        let field = field.into();
        let members = std::mem::take(self.owner_vector_mut(owner, &field)?);
        for member in &members {
            self.remove_subtree(*member);
        }
        if !members.is_empty() {
            self.hub
                .broadcast(PropChange::new(owner, field, 0, 0, members.len()));
        }
        Ok(members.len())
    }

    /// Re-broadcasts an arbitrary change, for collaborators that mutate
    /// state the store does not model itself
    pub fn notify(&self, change: PropChange) {
        self.hub.broadcast(change);
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn vector_len(&self, owner: ObjectId, field: &FieldRef) -> Result<usize> {
        Ok(self.vector_property(owner, field)?.len())
    }

    fn owner_vector_mut(&mut self, owner: ObjectId, field: &FieldRef) -> Result<&mut Vec<ObjectId>> {
        self.expect_vector(field)?;
        let object = self
            .objects
            .get_mut(&owner)
            .ok_or(ListError::UnknownObject(owner))?;
        Ok(object.vectors.entry(field.clone()).or_default())
    }

    fn detach(&mut self, owner: ObjectId, field: &FieldRef, id: ObjectId) -> Option<usize> {
        let vector = self.objects.get_mut(&owner)?.vectors.get_mut(field)?;
        let index = vector.iter().position(|member| *member == id)?;
        vector.remove(index);
        Some(index)
    }

    fn remove_subtree(&mut self, id: ObjectId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(object) = self.objects.remove(&current) {
                self.guids.remove(&object.guid);
                for (field, members) in object.vectors {
                    if !members.is_empty() {
                        self.hub
                            .broadcast(PropChange::new(current, field, 0, 0, members.len()));
                    }
                    pending.extend(members);
                }
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for InMemoryStore {
    fn is_valid(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    fn get_owner(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(&id)?.owner.as_ref().map(|(owner, _)| *owner)
    }

    fn owning_field(&self, id: ObjectId) -> Option<FieldRef> {
        self.objects.get(&id)?.owner.as_ref().map(|(_, field)| field.clone())
    }

    fn class_of(&self, id: ObjectId) -> Option<ClassId> {
        self.objects.get(&id).map(|object| object.class.clone())
    }

    fn guid_of(&self, id: ObjectId) -> Option<Uuid> {
        self.objects.get(&id).map(|object| object.guid)
    }

    fn id_for_guid(&self, guid: &Uuid) -> Option<ObjectId> {
        self.guids.get(guid).copied()
    }

    fn vector_property(&self, owner: ObjectId, field: &FieldRef) -> Result<Vec<ObjectId>> {
        self.expect_vector(field)?;
        let object = self.objects.get(&owner).ok_or(ListError::UnknownObject(owner))?;
        Ok(object.vectors.get(field).cloned().unwrap_or_default())
    }

    fn property(&self, id: ObjectId, field: &FieldRef) -> Result<Value> {
        self.field_kind(field)?;
        let object = self.objects.get(&id).ok_or(ListError::UnknownObject(id))?;
        Ok(object.scalars.get(field).cloned().unwrap_or(Value::Null))
    }

    fn field_exists(&self, field: &FieldRef) -> bool {
        self.fields.contains_key(field)
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.hub.unsubscribe(id);
    }
}
