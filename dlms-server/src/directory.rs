//! Logical devices and the objects they expose
//!
//! A logical device owns its object table, its restriction table and an
//! optional interceptor. Lookups are synchronous; the tables sit behind
//! short-lived `RwLock`s so objects can be registered while associations run.

use crate::range_set::RangeSet;
use dlms_application::pdu::{
    ActionResult, CosemAttributeDescriptor, CosemMethodDescriptor, DataAccessResult,
};
use dlms_core::{DataObject, DlmsError, DlmsResult, ObisCode};
use dlms_interface::interceptor::{self, Interceptor, InvocationContext, InvocationOutcome, InvocationTarget};
use dlms_interface::{AccessRequest, CosemObject, RestrictionTable, ShortNameMember};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct ObjectTable {
    by_name: HashMap<ObisCode, Arc<CosemObject>>,
    short_names: RangeSet<Arc<CosemObject>>,
}

/// One logical device: its objects, its client restrictions, its interceptor
pub struct LogicalDevice {
    id: u16,
    objects: RwLock<ObjectTable>,
    restrictions: Arc<RestrictionTable>,
    interceptor: Option<Arc<dyn Interceptor>>,
}

impl LogicalDevice {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            objects: RwLock::new(ObjectTable::default()),
            restrictions: Arc::new(RestrictionTable::new()),
            interceptor: None,
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Share a restriction table, e.g. with a Security Setup object.
    pub fn with_restrictions(mut self, restrictions: Arc<RestrictionTable>) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn restrictions(&self) -> &Arc<RestrictionTable> {
        &self.restrictions
    }

    /// Register an object.
    ///
    /// # Errors
    /// `InvalidData` when the logical name is already taken or the object's
    /// short-name range overlaps another object's.
    pub fn register(&self, object: CosemObject) -> DlmsResult<()> {
        let object = Arc::new(object);
        let mut table = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        if table.by_name.contains_key(&object.logical_name()) {
            return Err(DlmsError::InvalidData(format!(
                "Object {} already registered on logical device {}",
                object.logical_name(),
                self.id
            )));
        }
        if let Some(base) = object.short_name() {
            let end = base.checked_add(object.short_name_span()).ok_or_else(|| {
                DlmsError::InvalidData(format!("Short names of {} overflow", object.logical_name()))
            })?;
            table
                .short_names
                .insert(base..end, Arc::clone(&object))
                .map_err(|conflict| {
                    DlmsError::InvalidData(format!(
                        "Short names 0x{:04X}..0x{:04X} of {} overlap 0x{:04X}..0x{:04X}",
                        base,
                        end,
                        object.logical_name(),
                        conflict.start,
                        conflict.end
                    ))
                })?;
        }
        log::debug!(
            "Registered class {} object {} on logical device {}",
            object.class_id(),
            object.logical_name(),
            self.id
        );
        table.by_name.insert(object.logical_name(), object);
        Ok(())
    }

    /// Remove an object and free its short names.
    pub fn unregister(&self, logical_name: &ObisCode) -> Option<Arc<CosemObject>> {
        let mut table = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let object = table.by_name.remove(logical_name)?;
        if let Some(base) = object.short_name() {
            table.short_names.remove(base);
        }
        Some(object)
    }

    pub fn object(&self, logical_name: &ObisCode) -> Option<Arc<CosemObject>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .get(logical_name)
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).by_name.len()
    }

    /// Object and member a short-name variable refers to.
    pub fn resolve_short_name(&self, variable_name: u16) -> Option<(Arc<CosemObject>, ShortNameMember)> {
        let table = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let (range, object) = table.short_names.get(variable_name)?;
        let member = object.member_at(variable_name - range.start)?;
        Some((Arc::clone(object), member))
    }

    fn lookup(&self, class_id: u16, logical_name: &ObisCode) -> Result<Arc<CosemObject>, DataAccessResult> {
        let object = self.object(logical_name).ok_or(DataAccessResult::ObjectUndefined)?;
        if object.class_id() != class_id {
            return Err(DataAccessResult::ObjectClassInconsistent);
        }
        Ok(object)
    }

    /// Read one attribute through the access rights and the interceptor.
    pub fn get(
        &self,
        request: &AccessRequest,
        descriptor: &CosemAttributeDescriptor,
    ) -> Result<DataObject, DataAccessResult> {
        let context = InvocationContext {
            target: InvocationTarget::Get(*descriptor),
            parameters: request.selection.as_ref().map(|s| &s.access_parameters),
            security_policy: request.security_policy,
            connection_id: request.connection_id,
            client_id: request.client_id,
        };
        interceptor::intercept(self.interceptor.as_deref(), &context, || {
            InvocationOutcome::Get(self.get_unchecked(request, descriptor))
        })
        .into_get()
    }

    fn get_unchecked(
        &self,
        request: &AccessRequest,
        descriptor: &CosemAttributeDescriptor,
    ) -> Result<DataObject, DataAccessResult> {
        let object = self.lookup(descriptor.class_id, &descriptor.instance_id)?;
        let attribute = object
            .attribute(descriptor.attribute_id)
            .ok_or(DataAccessResult::ObjectUnavailable)?;
        if !attribute.mode.permits_read(request.authenticated) {
            return Err(DataAccessResult::ReadWriteDenied);
        }
        attribute.accessor.get(request)
    }

    /// Write one attribute through the access rights and the interceptor.
    pub fn set(
        &self,
        request: &AccessRequest,
        descriptor: &CosemAttributeDescriptor,
        value: DataObject,
    ) -> DataAccessResult {
        let context = InvocationContext {
            target: InvocationTarget::Set(*descriptor),
            parameters: Some(&value),
            security_policy: request.security_policy,
            connection_id: request.connection_id,
            client_id: request.client_id,
        };
        let result = interceptor::intercept(self.interceptor.as_deref(), &context, || {
            InvocationOutcome::Set(self.set_unchecked(request, descriptor, value.clone()))
        })
        .into_set();
        match result {
            Ok(()) => DataAccessResult::Success,
            Err(code) => code,
        }
    }

    fn set_unchecked(
        &self,
        request: &AccessRequest,
        descriptor: &CosemAttributeDescriptor,
        value: DataObject,
    ) -> Result<(), DataAccessResult> {
        let object = self.lookup(descriptor.class_id, &descriptor.instance_id)?;
        let attribute = object
            .attribute(descriptor.attribute_id)
            .ok_or(DataAccessResult::ObjectUnavailable)?;
        if !attribute.mode.permits_write(request.authenticated) {
            return Err(DataAccessResult::ReadWriteDenied);
        }
        attribute.accessor.set(request, value)
    }

    /// Invoke one method through the access rights and the interceptor.
    pub fn invoke_method(
        &self,
        request: &AccessRequest,
        descriptor: &CosemMethodDescriptor,
        parameters: Option<DataObject>,
    ) -> Result<Option<DataObject>, ActionResult> {
        let context = InvocationContext {
            target: InvocationTarget::Action(*descriptor),
            parameters: parameters.as_ref(),
            security_policy: request.security_policy,
            connection_id: request.connection_id,
            client_id: request.client_id,
        };
        interceptor::intercept(self.interceptor.as_deref(), &context, || {
            InvocationOutcome::Action(self.invoke_unchecked(request, descriptor, parameters.clone()))
        })
        .into_action()
    }

    fn invoke_unchecked(
        &self,
        request: &AccessRequest,
        descriptor: &CosemMethodDescriptor,
        parameters: Option<DataObject>,
    ) -> Result<Option<DataObject>, ActionResult> {
        let object = self
            .lookup(descriptor.class_id, &descriptor.instance_id)
            .map_err(|code| match code {
                DataAccessResult::ObjectClassInconsistent => ActionResult::ObjectClassInconsistent,
                _ => ActionResult::ObjectUndefined,
            })?;
        let method = object
            .method(descriptor.method_id)
            .ok_or(ActionResult::ObjectUnavailable)?;
        if !method.mode.permits(request.authenticated) {
            return Err(ActionResult::ReadWriteDenied);
        }
        method.accessor.invoke(request, parameters)
    }
}

impl fmt::Debug for LogicalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalDevice")
            .field("id", &self.id)
            .field("objects", &self.object_count())
            .field("restricted", &self.restrictions.is_restricted())
            .field("interceptor", &self.interceptor.is_some())
            .finish()
    }
}

/// Logical devices of one server, by id
#[derive(Debug, Default)]
pub struct ObjectDirectory {
    devices: RwLock<HashMap<u16, Arc<LogicalDevice>>>,
}

impl ObjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device, replacing any device with the same id.
    pub fn add_device(&self, device: LogicalDevice) -> Arc<LogicalDevice> {
        let device = Arc::new(device);
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.id(), Arc::clone(&device));
        device
    }

    pub fn device(&self, logical_device_id: u16) -> Option<Arc<LogicalDevice>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&logical_device_id)
            .cloned()
    }

    pub fn get(
        &self,
        request: &AccessRequest,
        descriptor: &CosemAttributeDescriptor,
    ) -> Result<DataObject, DataAccessResult> {
        self.device(request.logical_device_id)
            .ok_or(DataAccessResult::ObjectUndefined)?
            .get(request, descriptor)
    }

    pub fn set(
        &self,
        request: &AccessRequest,
        descriptor: &CosemAttributeDescriptor,
        value: DataObject,
    ) -> DataAccessResult {
        match self.device(request.logical_device_id) {
            Some(device) => device.set(request, descriptor, value),
            None => DataAccessResult::ObjectUndefined,
        }
    }

    pub fn invoke_method(
        &self,
        request: &AccessRequest,
        descriptor: &CosemMethodDescriptor,
        parameters: Option<DataObject>,
    ) -> Result<Option<DataObject>, ActionResult> {
        self.device(request.logical_device_id)
            .ok_or(ActionResult::ObjectUndefined)?
            .invoke_method(request, descriptor, parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlms_interface::access::{AttributeAccessMode, MethodAccessMode};
    use dlms_interface::{Data, MethodAccessor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COUNTER: ObisCode = ObisCode::new(0, 0, 96, 1, 0, 255);
    const SECRET: ObisCode = ObisCode::new(0, 0, 96, 1, 1, 255);

    struct Echo;

    impl MethodAccessor for Echo {
        fn invoke(
            &self,
            _request: &AccessRequest,
            parameters: Option<DataObject>,
        ) -> Result<Option<DataObject>, ActionResult> {
            Ok(parameters)
        }
    }

    fn device() -> LogicalDevice {
        let device = LogicalDevice::new(1);
        device
            .register(
                Data::new(COUNTER, DataObject::Unsigned32(7))
                    .into_object()
                    .with_method(1, MethodAccessMode::Access, Arc::new(Echo))
                    .with_short_name(0x100),
            )
            .unwrap();
        device
            .register(
                Data::new(SECRET, DataObject::Unsigned8(1))
                    .with_access(AttributeAccessMode::AuthenticatedReadWrite)
                    .into_object(),
            )
            .unwrap();
        device
    }

    fn value_of(obis: ObisCode) -> CosemAttributeDescriptor {
        CosemAttributeDescriptor::new(Data::CLASS_ID, obis, Data::ATTR_VALUE)
    }

    #[test]
    fn test_get_and_set() {
        let device = device();
        let request = AccessRequest::new(1, 16, 1);
        assert_eq!(device.get(&request, &value_of(COUNTER)), Ok(DataObject::Unsigned32(7)));
        assert_eq!(
            device.set(&request, &value_of(COUNTER), DataObject::Unsigned32(8)),
            DataAccessResult::Success
        );
        assert_eq!(device.get(&request, &value_of(COUNTER)), Ok(DataObject::Unsigned32(8)));
    }

    #[test]
    fn test_lookup_failures() {
        let device = device();
        let request = AccessRequest::new(1, 16, 1);
        let unknown = value_of(ObisCode::new(1, 0, 1, 8, 0, 255));
        assert_eq!(device.get(&request, &unknown), Err(DataAccessResult::ObjectUndefined));
        let wrong_class = CosemAttributeDescriptor::new(3, COUNTER, 2);
        assert_eq!(
            device.get(&request, &wrong_class),
            Err(DataAccessResult::ObjectClassInconsistent)
        );
        let missing_attribute = CosemAttributeDescriptor::new(1, COUNTER, 9);
        assert_eq!(
            device.get(&request, &missing_attribute),
            Err(DataAccessResult::ObjectUnavailable)
        );
        let method = CosemMethodDescriptor::new(1, COUNTER, 4);
        assert_eq!(
            device.invoke_method(&request, &method, None),
            Err(ActionResult::ObjectUnavailable)
        );
    }

    #[test]
    fn test_authenticated_only_attribute() {
        let device = device();
        let anonymous = AccessRequest::new(1, 16, 1);
        assert_eq!(
            device.get(&anonymous, &value_of(SECRET)),
            Err(DataAccessResult::ReadWriteDenied)
        );
        assert_eq!(
            device.set(&anonymous, &value_of(SECRET), DataObject::Unsigned8(2)),
            DataAccessResult::ReadWriteDenied
        );
        let authenticated = anonymous.authenticated(true);
        assert_eq!(device.get(&authenticated, &value_of(SECRET)), Ok(DataObject::Unsigned8(1)));
    }

    #[test]
    fn test_invoke_method() {
        let device = device();
        let request = AccessRequest::new(1, 16, 1);
        let method = CosemMethodDescriptor::new(1, COUNTER, 1);
        assert_eq!(
            device.invoke_method(&request, &method, Some(DataObject::Integer8(-1))),
            Ok(Some(DataObject::Integer8(-1)))
        );
    }

    #[test]
    fn test_registration_conflicts() {
        let device = device();
        assert!(device.register(Data::new(COUNTER, DataObject::Null).into_object()).is_err());
        let overlapping = Data::new(ObisCode::new(0, 0, 96, 1, 2, 255), DataObject::Null)
            .into_object()
            .with_short_name(0x108);
        assert!(device.register(overlapping).is_err());
        assert_eq!(device.object_count(), 2);

        assert!(device.unregister(&COUNTER).is_some());
        let reused = Data::new(ObisCode::new(0, 0, 96, 1, 2, 255), DataObject::Null)
            .into_object()
            .with_short_name(0x108);
        device.register(reused).unwrap();
    }

    #[test]
    fn test_short_name_resolution() {
        let device = device();
        let (object, member) = device.resolve_short_name(0x108).unwrap();
        assert_eq!(object.logical_name(), COUNTER);
        assert_eq!(member, ShortNameMember::Attribute(2));
        let (_, member) = device.resolve_short_name(0x110).unwrap();
        assert_eq!(member, ShortNameMember::Method(1));
        assert!(device.resolve_short_name(0x104).is_none());
        assert!(device.resolve_short_name(0x118).is_none());
    }

    struct CountingInterceptor {
        calls: AtomicUsize,
    }

    impl Interceptor for CountingInterceptor {
        fn intercept(
            &self,
            context: &InvocationContext<'_>,
            proceed: &mut dyn FnMut() -> InvocationOutcome,
        ) -> InvocationOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match context.target {
                InvocationTarget::Set(_) if context.client_id == 1 => {
                    InvocationOutcome::Set(Err(DataAccessResult::TemporaryFailure))
                }
                _ => proceed(),
            }
        }
    }

    #[test]
    fn test_interceptor_wraps_every_access() {
        let interceptor = Arc::new(CountingInterceptor {
            calls: AtomicUsize::new(0),
        });
        let device = LogicalDevice::new(1).with_interceptor(interceptor.clone());
        device.register(Data::new(COUNTER, DataObject::Unsigned8(0)).into_object()).unwrap();

        let public = AccessRequest::new(1, 1, 1);
        assert_eq!(
            device.set(&public, &value_of(COUNTER), DataObject::Unsigned8(1)),
            DataAccessResult::TemporaryFailure
        );
        let management = AccessRequest::new(1, 2, 1);
        assert_eq!(
            device.set(&management, &value_of(COUNTER), DataObject::Unsigned8(1)),
            DataAccessResult::Success
        );
        assert_eq!(device.get(&public, &value_of(COUNTER)), Ok(DataObject::Unsigned8(1)));
        assert_eq!(interceptor.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_directory_routes_by_logical_device() {
        let directory = ObjectDirectory::new();
        directory.add_device(device());
        let request = AccessRequest::new(1, 16, 1);
        assert_eq!(directory.get(&request, &value_of(COUNTER)), Ok(DataObject::Unsigned32(7)));
        let elsewhere = AccessRequest::new(2, 16, 1);
        assert_eq!(
            directory.get(&elsewhere, &value_of(COUNTER)),
            Err(DataAccessResult::ObjectUndefined)
        );
        assert_eq!(
            directory.set(&elsewhere, &value_of(COUNTER), DataObject::Null),
            DataAccessResult::ObjectUndefined
        );
    }
}
