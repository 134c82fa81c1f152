//! Shared reference data: species, box types and food types.
//!
//! # Invariants
//! - Each list is fetched at most once per service instance once the backend
//!   answered with rows.
//! - Built-in lists are served (and not cached) when the backend is
//!   unreachable or the table is empty, so a later call retries.

use super::{ServiceContext, ServiceResult};
use crate::gateway::{tables, Direction, Query, RemoteGateway};
use crate::model::catalog::{
    builtin_box_types, builtin_food_types, builtin_species, BoxType, FoodType, Species,
};
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::cell::RefCell;

pub struct GeneralDataService<'a, G: RemoteGateway + ?Sized> {
    ctx: ServiceContext<'a, G>,
    species: RefCell<Option<Vec<Species>>>,
    box_types: RefCell<Option<Vec<BoxType>>>,
    food_types: RefCell<Option<Vec<FoodType>>>,
}

impl<'a, G: RemoteGateway + ?Sized> GeneralDataService<'a, G> {
    pub fn new(ctx: ServiceContext<'a, G>) -> Self {
        Self {
            ctx,
            species: RefCell::new(None),
            box_types: RefCell::new(None),
            food_types: RefCell::new(None),
        }
    }

    pub fn list_species(&self) -> ServiceResult<Vec<Species>> {
        self.cached(&self.species, tables::SPECIES, "common_name", builtin_species)
    }

    pub fn list_box_types(&self) -> ServiceResult<Vec<BoxType>> {
        self.cached(&self.box_types, tables::BOX_TYPES, "name", builtin_box_types)
    }

    pub fn list_food_types(&self) -> ServiceResult<Vec<FoodType>> {
        self.cached(&self.food_types, tables::FOOD_TYPES, "name", builtin_food_types)
    }

    /// Drops every cached list.
    pub fn invalidate(&self) {
        self.species.replace(None);
        self.box_types.replace(None);
        self.food_types.replace(None);
    }

    fn cached<T: Clone + DeserializeOwned>(
        &self,
        cache: &RefCell<Option<Vec<T>>>,
        table: &str,
        order_column: &str,
        builtin: fn() -> Vec<T>,
    ) -> ServiceResult<Vec<T>> {
        if let Some(items) = cache.borrow().as_ref() {
            return Ok(items.clone());
        }

        let query = Query::table(table).order_by(order_column, Direction::Asc);
        match self.ctx.select::<T>(&query) {
            Ok(items) if !items.is_empty() => {
                info!(
                    "event=general_data_load module=service status=ok table={table} count={}",
                    items.len()
                );
                cache.replace(Some(items.clone()));
                Ok(items)
            }
            Ok(_) => {
                info!("event=general_data_load module=service status=ok table={table} source=builtin");
                Ok(builtin())
            }
            Err(err) if err.is_offline() => {
                warn!("event=general_data_load module=service status=error table={table} source=builtin error={err}");
                Ok(builtin())
            }
            Err(err) => Err(err),
        }
    }
}
