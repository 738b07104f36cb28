//! Reference data: priced services, partner profiles and device tokens.

use crate::domain::catalog::{PartnerProfile, Service};
use crate::domain::ids::{ServiceId, UserId};
use crate::domain::money::Money;
use crate::domain::ports::{ServiceDraft, StoreHandle};
use crate::error::{BookingError, Result};
use tracing::info;

pub struct CatalogService {
    store: StoreHandle,
}

impl CatalogService {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn register_service(&self, draft: ServiceDraft) -> Result<Service> {
        draft.validate()?;
        let mut uow = self.store.begin().await?;
        let service = uow.insert_service(draft).await?;
        uow.commit().await?;
        info!(
            service_id = %service.id,
            price = %service.price,
            admin_fee = %service.admin_fee,
            "service registered"
        );
        Ok(service)
    }

    /// Reprices or renames a service. Orders already placed keep the total
    /// they were created with.
    pub async fn update_service(
        &self,
        id: ServiceId,
        name: Option<String>,
        price: Option<Money>,
        admin_fee: Option<Money>,
    ) -> Result<Service> {
        let mut uow = self.store.begin().await?;
        let mut service = uow
            .service(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Service {}", id)))?;
        if let Some(name) = name {
            service.name = name;
        }
        if let Some(price) = price {
            service.price = price;
        }
        if let Some(admin_fee) = admin_fee {
            service.admin_fee = admin_fee;
        }
        service.validate()?;
        uow.update_service(service.clone()).await?;
        uow.commit().await?;
        info!(service_id = %service.id, price = %service.price, "service updated");
        Ok(service)
    }

    /// The bookable catalog, ordered by id.
    pub async fn services(&self) -> Result<Vec<Service>> {
        let mut uow = self.store.begin().await?;
        uow.services().await
    }

    /// Removes a service nobody has booked yet. Booked services stay so that
    /// order history and payouts can still price against them.
    pub async fn delete_service(&self, id: ServiceId) -> Result<()> {
        let mut uow = self.store.begin().await?;
        if uow.service(id).await?.is_none() {
            return Err(BookingError::NotFound(format!("Service {}", id)));
        }
        if uow.service_has_orders(id).await? {
            return Err(BookingError::InvalidState(format!(
                "service {} has been booked and cannot be deleted, update it instead",
                id
            )));
        }
        uow.delete_service(id).await?;
        uow.commit().await?;
        info!(service_id = %id, "service deleted");
        Ok(())
    }

    /// New partners start out accepting jobs.
    pub async fn register_partner(&self, user_id: UserId) -> Result<PartnerProfile> {
        let mut uow = self.store.begin().await?;
        let profile = uow.insert_partner(user_id, true).await?;
        uow.commit().await?;
        info!(partner_id = %profile.id, user_id = %user_id, "partner registered");
        Ok(profile)
    }

    /// Flips whether the partner hears about open bookings.
    pub async fn toggle_availability(&self, user_id: UserId) -> Result<PartnerProfile> {
        let mut uow = self.store.begin().await?;
        let mut profile = uow
            .partner_by_user(user_id)
            .await?
            .ok_or_else(|| {
                BookingError::NotFound(format!("Partner profile for user {}", user_id))
            })?;
        profile.is_active = !profile.is_active;
        uow.update_partner(profile.clone()).await?;
        uow.commit().await?;
        info!(
            partner_id = %profile.id,
            active = profile.is_active,
            "partner availability changed"
        );
        Ok(profile)
    }

    pub async fn register_device(&self, user_id: UserId, token: String) -> Result<()> {
        if token.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "Device token is required".to_string(),
            ));
        }
        let mut uow = self.store.begin().await?;
        uow.set_device_token(user_id, token).await?;
        uow.commit().await
    }
}
