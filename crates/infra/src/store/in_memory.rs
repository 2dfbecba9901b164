use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use gatepass_core::{AppointmentId, CheckLogId, Entity, PassId, UserId, VisitorId};
use gatepass_passes::{CheckLog, CheckType, Pass};
use gatepass_visitors::{Appointment, User, Visitor, VisitorStatus};

use super::{
    AppointmentFilter, CheckCounts, CheckLogFilter, EntityStore, Page, Pagination, PassFilter,
    StoreError, StoreTx, UserFilter, VisitorFilter,
};

#[derive(Debug, Default)]
struct State {
    visitors: HashMap<VisitorId, Visitor>,
    passes: HashMap<PassId, Pass>,
    logs: Vec<CheckLog>,
    appointments: HashMap<AppointmentId, Appointment>,
    users: HashMap<UserId, User>,
}

impl State {
    fn host_of(&self, visitor_id: VisitorId) -> Option<UserId> {
        self.visitors.get(&visitor_id).map(|v| v.host_id)
    }
}

/// In-memory entity store.
///
/// Intended for tests/dev. Per-visitor serialization comes from an async mutex
/// per visitor id; staged writes are applied under the state write lock on
/// commit, so readers never observe half a transaction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    locks: Mutex<HashMap<VisitorId, Arc<tokio::sync::Mutex<()>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&state))
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        f(&mut state)
    }

    fn lock_for(&self, visitor_id: VisitorId) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(locks.entry(visitor_id).or_default().clone())
    }
}

/// Insert a record whose id must be new.
fn insert_new<E>(map: &mut HashMap<E::Id, E>, entity: &E, kind: &str) -> Result<(), StoreError>
where
    E: Entity + Clone,
    E::Id: core::fmt::Display,
{
    let id = entity.id().clone();
    if map.contains_key(&id) {
        return Err(StoreError::Duplicate(format!("{kind} {id}")));
    }
    map.insert(id, entity.clone());
    Ok(())
}

fn put<E: Entity + Clone>(map: &mut HashMap<E::Id, E>, entity: &E) {
    map.insert(entity.id().clone(), entity.clone());
}

/// Ties keep the later append first.
fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> DateTime<Utc>) {
    items.reverse();
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn begin(&self, visitor_id: VisitorId) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.lock_for(visitor_id)?.lock_owned().await;
        Ok(Box::new(InMemoryTx {
            visitor_id,
            state: self.state.clone(),
            _guard: guard,
            staged: Vec::new(),
        }))
    }

    async fn visitor(&self, id: VisitorId) -> Result<Option<Visitor>, StoreError> {
        self.read(|s| s.visitors.get(&id).cloned())
    }

    async fn insert_visitor(&self, visitor: &Visitor) -> Result<(), StoreError> {
        self.write(|s| insert_new(&mut s.visitors, visitor, "visitor"))
    }

    async fn list_visitors(
        &self,
        filter: &VisitorFilter,
        page: Pagination,
    ) -> Result<Page<Visitor>, StoreError> {
        let mut items = self.read(|s| {
            s.visitors
                .values()
                .filter(|v| filter.matches(v))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        newest_first(&mut items, |v| v.created_at);
        Ok(page.slice(items))
    }

    async fn pass(&self, id: PassId) -> Result<Option<Pass>, StoreError> {
        self.read(|s| s.passes.get(&id).cloned())
    }

    async fn set_pass_pdf_url(&self, id: PassId, url: &str) -> Result<(), StoreError> {
        self.write(|s| {
            if let Some(p) = s.passes.get_mut(&id) {
                p.pdf_url = Some(url.to_string());
            }
            Ok(())
        })
    }

    async fn list_passes(&self, filter: &PassFilter, page: Pagination) -> Result<Page<Pass>, StoreError> {
        let mut items = self.read(|s| {
            s.passes
                .values()
                .filter(|p| {
                    filter.status.is_none_or(|st| p.status == st)
                        && filter.visitor_id.is_none_or(|v| p.visitor_id == v)
                        && filter.search.as_deref().is_none_or(|q| {
                            p.pass_number.to_lowercase().contains(&q.to_lowercase())
                        })
                        && filter.hosted_by.is_none_or(|h| s.host_of(p.visitor_id) == Some(h))
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        newest_first(&mut items, |p| p.issued_at);
        Ok(page.slice(items))
    }

    async fn check_log(&self, id: CheckLogId) -> Result<Option<CheckLog>, StoreError> {
        self.read(|s| s.logs.iter().find(|l| l.id == id).cloned())
    }

    async fn list_check_logs(
        &self,
        filter: &CheckLogFilter,
        page: Pagination,
    ) -> Result<Page<CheckLog>, StoreError> {
        let mut items = self.read(|s| {
            s.logs
                .iter()
                .filter(|l| {
                    filter.visitor_id.is_none_or(|v| l.visitor_id == v)
                        && filter.kind.is_none_or(|k| l.kind == k)
                        && filter.start.is_none_or(|t| l.timestamp >= t)
                        && filter.end.is_none_or(|t| l.timestamp <= t)
                        && filter.hosted_by.is_none_or(|h| s.host_of(l.visitor_id) == Some(h))
                })
                .cloned()
                .collect::<Vec<_>>()
        })?;
        newest_first(&mut items, |l| l.timestamp);
        Ok(page.slice(items))
    }

    async fn visitor_history(&self, visitor_id: VisitorId) -> Result<Vec<CheckLog>, StoreError> {
        let mut items = self.read(|s| {
            s.logs
                .iter()
                .filter(|l| l.visitor_id == visitor_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        newest_first(&mut items, |l| l.timestamp);
        Ok(items)
    }

    async fn check_counts(&self, since: DateTime<Utc>) -> Result<CheckCounts, StoreError> {
        self.read(|s| {
            let mut counts = CheckCounts::default();
            for l in s.logs.iter().filter(|l| l.timestamp >= since) {
                match l.kind {
                    CheckType::CheckIn => counts.check_ins += 1,
                    CheckType::CheckOut => counts.check_outs += 1,
                }
            }
            counts.currently_checked_in = s
                .visitors
                .values()
                .filter(|v| {
                    v.status == VisitorStatus::CheckedIn
                        && v.actual_arrival.is_some_and(|a| a >= since)
                })
                .count() as u64;
            counts
        })
    }

    async fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        self.read(|s| s.appointments.get(&id).cloned())
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.write(|s| insert_new(&mut s.appointments, appointment, "appointment"))
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.write(|s| {
            put(&mut s.appointments, appointment);
            Ok(())
        })
    }

    async fn delete_appointment(&self, id: AppointmentId) -> Result<bool, StoreError> {
        self.write(|s| Ok(s.appointments.remove(&id).is_some()))
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
        page: Pagination,
    ) -> Result<Page<Appointment>, StoreError> {
        let mut items = self.read(|s| {
            s.appointments
                .values()
                .filter(|a| filter.matches(a))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        items.sort_by(|a, b| (b.date, &b.start_time).cmp(&(a.date, &a.start_time)));
        Ok(page.slice(items))
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.read(|s| s.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.write(|s| {
            if s.users.values().any(|u| u.email == user.email) {
                return Err(StoreError::Duplicate(format!("user {}", user.email)));
            }
            insert_new(&mut s.users, user, "user")
        })
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        self.write(|s| {
            if s.users.values().any(|u| u.id != user.id && u.email == user.email) {
                return Err(StoreError::Duplicate(format!("user {}", user.email)));
            }
            put(&mut s.users, user);
            Ok(())
        })
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        self.write(|s| Ok(s.users.remove(&id).is_some()))
    }

    async fn list_users(&self, filter: &UserFilter, page: Pagination) -> Result<Page<User>, StoreError> {
        let mut items = self.read(|s| {
            s.users
                .values()
                .filter(|u| filter.matches(u))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        newest_first(&mut items, |u| u.created_at);
        Ok(page.slice(items))
    }
}

#[derive(Debug)]
enum Staged {
    Visitor(Visitor),
    InsertPass(Pass),
    UpdatePass(Pass),
    Log(CheckLog),
}

/// Transaction over one visitor. Reads see committed state overlaid with this
/// transaction's own staged writes.
struct InMemoryTx {
    visitor_id: VisitorId,
    state: Arc<RwLock<State>>,
    _guard: OwnedMutexGuard<()>,
    staged: Vec<Staged>,
}

impl InMemoryTx {
    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&state))
    }

    fn staged_pass(&self, id: PassId) -> Option<&Pass> {
        self.staged.iter().rev().find_map(|w| match w {
            Staged::InsertPass(p) | Staged::UpdatePass(p) if p.id == id => Some(p),
            _ => None,
        })
    }

    fn staged_passes(&self) -> impl Iterator<Item = &Pass> {
        self.staged.iter().filter_map(|w| match w {
            Staged::InsertPass(p) | Staged::UpdatePass(p) => Some(p),
            _ => None,
        })
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    fn visitor_id(&self) -> VisitorId {
        self.visitor_id
    }

    async fn visitor(&mut self) -> Result<Option<Visitor>, StoreError> {
        let staged = self.staged.iter().rev().find_map(|w| match w {
            Staged::Visitor(v) => Some(v.clone()),
            _ => None,
        });
        match staged {
            Some(v) => Ok(Some(v)),
            None => self.read(|s| s.visitors.get(&self.visitor_id).cloned()),
        }
    }

    async fn pass(&mut self, id: PassId) -> Result<Option<Pass>, StoreError> {
        if let Some(p) = self.staged_pass(id) {
            return Ok(Some(p.clone()));
        }
        self.read(|s| s.passes.get(&id).cloned())
    }

    async fn blocking_pass(&mut self) -> Result<Option<Pass>, StoreError> {
        let mut current: HashMap<PassId, Pass> = self.read(|s| {
            s.passes
                .values()
                .filter(|p| p.visitor_id == self.visitor_id)
                .map(|p| (p.id, p.clone()))
                .collect()
        })?;
        for p in self.staged_passes() {
            put(&mut current, p);
        }
        Ok(current.into_values().find(|p| p.status.blocks_issuance()))
    }

    async fn pass_number_taken(&mut self, number: &str) -> Result<bool, StoreError> {
        if self.staged_passes().any(|p| p.pass_number == number) {
            return Ok(true);
        }
        self.read(|s| s.passes.values().any(|p| p.pass_number == number))
    }

    async fn latest_check_in_since(
        &mut self,
        since: DateTime<Utc>,
    ) -> Result<Option<CheckLog>, StoreError> {
        let staged = self.staged.iter().filter_map(|w| match w {
            Staged::Log(l) => Some(l.clone()),
            _ => None,
        });
        let committed = self.read(|s| {
            s.logs
                .iter()
                .filter(|l| l.visitor_id == self.visitor_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(committed
            .into_iter()
            .chain(staged)
            .filter(|l| l.kind == CheckType::CheckIn && l.timestamp >= since)
            // Ties go to the later append.
            .fold(None, |best: Option<CheckLog>, l| match best {
                Some(b) if b.timestamp > l.timestamp => Some(b),
                _ => Some(l),
            }))
    }

    async fn insert_pass(&mut self, pass: &Pass) -> Result<(), StoreError> {
        self.staged.push(Staged::InsertPass(pass.clone()));
        Ok(())
    }

    async fn update_pass(&mut self, pass: &Pass) -> Result<(), StoreError> {
        self.staged.push(Staged::UpdatePass(pass.clone()));
        Ok(())
    }

    async fn update_visitor(&mut self, visitor: &Visitor) -> Result<(), StoreError> {
        self.staged.push(Staged::Visitor(visitor.clone()));
        Ok(())
    }

    async fn append_check_log(&mut self, log: &CheckLog) -> Result<(), StoreError> {
        self.staged.push(Staged::Log(log.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut state = this.state.write().map_err(|_| StoreError::Poisoned)?;

        // Pass numbers are unique across visitors, which the visitor lock does not cover.
        for w in &this.staged {
            if let Staged::InsertPass(p) = w {
                if state.passes.values().any(|q| q.pass_number == p.pass_number) {
                    return Err(StoreError::Duplicate(format!("pass number {}", p.pass_number)));
                }
            }
        }

        for w in this.staged {
            match w {
                Staged::Visitor(v) => {
                    state.visitors.insert(v.id, v);
                }
                Staged::InsertPass(p) => {
                    state.passes.insert(p.id, p);
                }
                Staged::UpdatePass(p) => match state.passes.get_mut(&p.id) {
                    Some(current) => current.status = p.status,
                    None => {
                        state.passes.insert(p.id, p);
                    }
                },
                Staged::Log(l) => state.logs.push(l),
            }
        }
        Ok(())
    }
}
