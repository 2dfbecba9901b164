//! Visitor, appointment and user records outside the pass lifecycle.
//!
//! Plain CRUD behind the same policy table as the engines. Ownership checks run
//! after the record is loaded, so a missing record reports `NotFound` first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use gatepass_auth::{Operation, Principal, ResourceScope, authorize};
use gatepass_core::{AppointmentId, DomainError, UserId, VisitorId};
use gatepass_visitors::{
    Appointment, AppointmentStatus, AppointmentUpdate, NewAppointment, NewUser, NewVisitor,
    PhotoUpload, User, UserUpdate, Visitor, VisitorDecision, VisitorUpdate,
};

use crate::error::LifecycleError;
use crate::external::{DiskPhotoStore, Notification, Notifier, PhotoStore, dispatch};
use crate::store::{
    AppointmentFilter, EntityStore, Page, Pagination, StoreError, UserFilter, VisitorFilter,
};

fn missing(entity: &'static str) -> LifecycleError {
    LifecycleError::Domain(DomainError::not_found(entity))
}

fn appointment_scope(a: &Appointment) -> ResourceScope {
    ResourceScope::hosted_by(a.host_id).with_attendees(a.attendees.iter().copied())
}

pub struct Directory {
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
    photos: Arc<dyn PhotoStore>,
}

impl Directory {
    pub fn new(store: Arc<dyn EntityStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            photos: Arc::new(DiskPhotoStore::new("uploads")),
        }
    }

    pub fn with_photos(mut self, photos: Arc<dyn PhotoStore>) -> Self {
        self.photos = photos;
        self
    }

    // -- visitors ----------------------------------------------------------

    /// Register a visitor under an active employee or admin host.
    pub async fn register_visitor(
        &self,
        actor: &Principal,
        input: NewVisitor,
        now: DateTime<Utc>,
    ) -> Result<Visitor, LifecycleError> {
        authorize(actor, Operation::RegisterVisitor, &ResourceScope::unscoped())?;
        let host = self.store.user(input.host_id).await?;
        if !host.is_some_and(|h| h.is_active && h.role.can_host()) {
            return Err(DomainError::validation("Invalid host selected").into());
        }

        let visitor = Visitor::register(input, now)?;
        self.store.insert_visitor(&visitor).await?;
        info!(visitor_id = %visitor.id, host_id = %visitor.host_id, actor = %actor.user_id, "visitor registered");
        dispatch(
            &self.notifier,
            Notification::VisitorRegistered {
                visitor_id: visitor.id,
                host_id: visitor.host_id,
            },
        );
        Ok(visitor)
    }

    /// Employees only ever see the visitors they host.
    pub async fn list_visitors(
        &self,
        actor: &Principal,
        mut filter: VisitorFilter,
        page: Pagination,
    ) -> Result<Page<Visitor>, LifecycleError> {
        authorize(actor, Operation::ListVisitors, &ResourceScope::unscoped())?;
        if actor.is_host_scoped() {
            filter.host_id = Some(actor.user_id);
        }
        Ok(self.store.list_visitors(&filter, page).await?)
    }

    pub async fn visitor(&self, actor: &Principal, id: VisitorId) -> Result<Visitor, LifecycleError> {
        let visitor = self.store.visitor(id).await?.ok_or_else(|| missing("Visitor"))?;
        authorize(actor, Operation::ViewVisitor, &ResourceScope::hosted_by(visitor.host_id))?;
        Ok(visitor)
    }

    /// Edit a visitor's details. `status` is honoured for security/admin only and
    /// goes through the same transition rules as an explicit decision.
    pub async fn update_visitor(
        &self,
        actor: &Principal,
        id: VisitorId,
        update: VisitorUpdate,
        status: Option<VisitorDecision>,
        now: DateTime<Utc>,
    ) -> Result<Visitor, LifecycleError> {
        let loaded = self.store.visitor(id).await?.ok_or_else(|| missing("Visitor"))?;
        authorize(actor, Operation::UpdateVisitor, &ResourceScope::hosted_by(loaded.host_id))?;

        let mut tx = self.store.begin(id).await?;
        let mut visitor = tx.visitor().await?.ok_or_else(|| missing("Visitor"))?;
        visitor.apply_update(update, now)?;
        if let Some(decision) = status.filter(|_| actor.is_security_or_admin()) {
            visitor.decide(decision, now)?;
        }
        tx.update_visitor(&visitor).await?;
        tx.commit().await?;

        info!(visitor_id = %visitor.id, actor = %actor.user_id, "visitor updated");
        Ok(visitor)
    }

    /// Store a new photo for the visitor and point the record at it.
    pub async fn set_visitor_photo(
        &self,
        actor: &Principal,
        id: VisitorId,
        upload: PhotoUpload,
        now: DateTime<Utc>,
    ) -> Result<Visitor, LifecycleError> {
        let loaded = self.store.visitor(id).await?.ok_or_else(|| missing("Visitor"))?;
        authorize(actor, Operation::UpdateVisitor, &ResourceScope::hosted_by(loaded.host_id))?;
        upload.validate()?;

        let url = self.photos.save(id, &upload).await?;

        let mut tx = self.store.begin(id).await?;
        let mut visitor = tx.visitor().await?.ok_or_else(|| missing("Visitor"))?;
        visitor.set_photo(url, now);
        tx.update_visitor(&visitor).await?;
        tx.commit().await?;

        info!(visitor_id = %visitor.id, actor = %actor.user_id, bytes = upload.data.len(), "visitor photo stored");
        Ok(visitor)
    }

    // -- appointments ------------------------------------------------------

    /// Schedule an appointment hosted by the actor.
    pub async fn schedule_appointment(
        &self,
        actor: &Principal,
        input: NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<Appointment, LifecycleError> {
        let visitor = self
            .store
            .visitor(input.visitor_id)
            .await?
            .ok_or_else(|| missing("Visitor"))?;
        authorize(
            actor,
            Operation::ScheduleAppointment,
            &ResourceScope::hosted_by(visitor.host_id),
        )?;

        let appointment = Appointment::schedule(input, actor.user_id, now)?;
        self.store.insert_appointment(&appointment).await?;
        info!(appointment_id = %appointment.id, visitor_id = %appointment.visitor_id, "appointment scheduled");
        Ok(appointment)
    }

    /// Employees see appointments they host or attend.
    pub async fn list_appointments(
        &self,
        actor: &Principal,
        mut filter: AppointmentFilter,
        page: Pagination,
    ) -> Result<Page<Appointment>, LifecycleError> {
        authorize(actor, Operation::ListAppointments, &ResourceScope::unscoped())?;
        if actor.is_host_scoped() {
            filter.participant = Some(actor.user_id);
        }
        Ok(self.store.list_appointments(&filter, page).await?)
    }

    pub async fn appointment(
        &self,
        actor: &Principal,
        id: AppointmentId,
    ) -> Result<Appointment, LifecycleError> {
        let appointment = self
            .store
            .appointment(id)
            .await?
            .ok_or_else(|| missing("Appointment"))?;
        authorize(actor, Operation::ViewAppointment, &appointment_scope(&appointment))?;
        Ok(appointment)
    }

    pub async fn update_appointment(
        &self,
        actor: &Principal,
        id: AppointmentId,
        update: AppointmentUpdate,
        now: DateTime<Utc>,
    ) -> Result<Appointment, LifecycleError> {
        let mut appointment = self
            .store
            .appointment(id)
            .await?
            .ok_or_else(|| missing("Appointment"))?;
        authorize(
            actor,
            Operation::UpdateAppointment,
            &ResourceScope::hosted_by(appointment.host_id),
        )?;
        appointment.apply_update(update, now)?;
        self.store.update_appointment(&appointment).await?;
        Ok(appointment)
    }

    pub async fn set_appointment_status(
        &self,
        actor: &Principal,
        id: AppointmentId,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, LifecycleError> {
        let mut appointment = self
            .store
            .appointment(id)
            .await?
            .ok_or_else(|| missing("Appointment"))?;
        authorize(
            actor,
            Operation::ChangeAppointmentStatus,
            &appointment_scope(&appointment),
        )?;
        appointment.set_status(status, now)?;
        self.store.update_appointment(&appointment).await?;
        info!(appointment_id = %id, status = status.as_str(), actor = %actor.user_id, "appointment status changed");
        Ok(appointment)
    }

    pub async fn delete_appointment(&self, actor: &Principal, id: AppointmentId) -> Result<(), LifecycleError> {
        let appointment = self
            .store
            .appointment(id)
            .await?
            .ok_or_else(|| missing("Appointment"))?;
        authorize(
            actor,
            Operation::DeleteAppointment,
            &ResourceScope::hosted_by(appointment.host_id),
        )?;
        if !self.store.delete_appointment(id).await? {
            return Err(missing("Appointment"));
        }
        Ok(())
    }

    // -- users -------------------------------------------------------------

    pub async fn create_user(
        &self,
        actor: &Principal,
        input: NewUser,
        now: DateTime<Utc>,
    ) -> Result<User, LifecycleError> {
        authorize(actor, Operation::CreateUser, &ResourceScope::unscoped())?;
        let user = User::provision(input, now)?;
        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(DomainError::conflict("User already exists").into());
            }
            Err(e) => return Err(e.into()),
        }
        info!(user_id = %user.id, role = %user.role, actor = %actor.user_id, "user created");
        Ok(user)
    }

    pub async fn list_users(
        &self,
        actor: &Principal,
        filter: UserFilter,
        page: Pagination,
    ) -> Result<Page<User>, LifecycleError> {
        authorize(actor, Operation::ListUsers, &ResourceScope::unscoped())?;
        Ok(self.store.list_users(&filter, page).await?)
    }

    pub async fn user(&self, actor: &Principal, id: UserId) -> Result<User, LifecycleError> {
        let user = self.store.user(id).await?.ok_or_else(|| missing("User"))?;
        authorize(actor, Operation::ViewUser, &ResourceScope::user(id))?;
        Ok(user)
    }

    pub async fn update_user(
        &self,
        actor: &Principal,
        id: UserId,
        update: UserUpdate,
    ) -> Result<User, LifecycleError> {
        let mut user = self.store.user(id).await?.ok_or_else(|| missing("User"))?;
        authorize(actor, Operation::UpdateUser, &ResourceScope::user(id))?;
        user.apply_update(update, actor.is_admin())?;
        match self.store.update_user(&user).await {
            Ok(()) => Ok(user),
            Err(StoreError::Duplicate(_)) => Err(DomainError::conflict("Email already in use").into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_user(&self, actor: &Principal, id: UserId) -> Result<(), LifecycleError> {
        authorize(actor, Operation::DeleteUser, &ResourceScope::unscoped())?;
        if !self.store.delete_user(id).await? {
            return Err(missing("User"));
        }
        info!(user_id = %id, actor = %actor.user_id, "user deleted");
        Ok(())
    }
}
