//! Stage-1 saver: regions, venues, cups.

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{MySql, MySqlConnection, QueryBuilder};
use tracing::info;

use crate::db::{DbAccessor, DbResult};

#[derive(Debug, Clone)]
pub struct RegionRow {
    pub region_id: String,
    pub region_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct VenueRow {
    pub venue_id: String,
    pub venue_name: String,
    pub name1: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub website_url: Option<String>,
    pub bank_feature: Option<String>,
    pub track_straight_distance: Option<f64>,
    pub track_angle_center: Option<String>,
    pub track_angle_straight: Option<String>,
    pub home_width: Option<i64>,
    pub back_width: Option<i64>,
    pub center_width: Option<f64>,
    pub region_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CupRow {
    pub cup_id: String,
    pub cup_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: Option<i64>,
    pub grade: Option<i64>,
    pub venue_id: String,
    /// Comma-joined label set, e.g. `GI` or `GI,ナイター`.
    pub labels: String,
    pub players_unfixed: i64,
}

pub struct Step1Saver {
    accessor: Arc<DbAccessor>,
}

impl Step1Saver {
    pub fn new(accessor: Arc<DbAccessor>) -> Self {
        Self { accessor }
    }

    /// Upsert one month's listings in a single transaction, writing the
    /// three tables in lock order.
    pub async fn save_month(
        &self,
        regions: &[RegionRow],
        venues: &[VenueRow],
        cups: &[CupRow],
        batch_size: usize,
    ) -> DbResult<()> {
        let tables = self.accessor.ordered_tables(&["regions", "venues", "cups"]);
        let tables = &tables;

        self.accessor
            .with_retry(|| async move {
                let mut tx = self.accessor.pool().begin().await?;
                for table in tables {
                    match *table {
                        "regions" => upsert_regions(&mut tx, regions, batch_size).await?,
                        "venues" => upsert_venues(&mut tx, venues, batch_size).await?,
                        "cups" => upsert_cups(&mut tx, cups, batch_size).await?,
                        _ => {}
                    }
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;

        info!(
            regions = regions.len(),
            venues = venues.len(),
            cups = cups.len(),
            "monthly listing saved"
        );
        Ok(())
    }
}

async fn upsert_regions(
    tx: &mut MySqlConnection,
    rows: &[RegionRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder =
            QueryBuilder::<MySql>::new("INSERT INTO regions (region_id, region_name) ");
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.region_id);
            b.push_bind(&row.region_name);
        });
        builder.push(" ON DUPLICATE KEY UPDATE region_name = VALUES(region_name)");
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_venues(
    tx: &mut MySqlConnection,
    rows: &[VenueRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO venues (venue_id, venue_name, name1, address, phone_number, \
             website_url, bank_feature, track_straight_distance, track_angle_center, \
             track_angle_straight, home_width, back_width, center_width, region_id) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.venue_id);
            b.push_bind(&row.venue_name);
            b.push_bind(&row.name1);
            b.push_bind(&row.address);
            b.push_bind(&row.phone_number);
            b.push_bind(&row.website_url);
            b.push_bind(&row.bank_feature);
            b.push_bind(row.track_straight_distance);
            b.push_bind(&row.track_angle_center);
            b.push_bind(&row.track_angle_straight);
            b.push_bind(row.home_width);
            b.push_bind(row.back_width);
            b.push_bind(row.center_width);
            b.push_bind(&row.region_id);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE venue_name = VALUES(venue_name), \
             name1 = VALUES(name1), address = VALUES(address), \
             phone_number = VALUES(phone_number), website_url = VALUES(website_url), \
             bank_feature = VALUES(bank_feature), \
             track_straight_distance = VALUES(track_straight_distance), \
             track_angle_center = VALUES(track_angle_center), \
             track_angle_straight = VALUES(track_angle_straight), \
             home_width = VALUES(home_width), back_width = VALUES(back_width), \
             center_width = VALUES(center_width), region_id = VALUES(region_id)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}

async fn upsert_cups(
    tx: &mut MySqlConnection,
    rows: &[CupRow],
    batch_size: usize,
) -> sqlx::Result<()> {
    for chunk in rows.chunks(batch_size.max(1)) {
        let mut builder = QueryBuilder::<MySql>::new(
            "INSERT INTO cups (cup_id, cup_name, start_date, end_date, duration, grade, \
             venue_id, labels, players_unfixed) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(&row.cup_id);
            b.push_bind(&row.cup_name);
            b.push_bind(row.start_date);
            b.push_bind(row.end_date);
            b.push_bind(row.duration);
            b.push_bind(row.grade);
            b.push_bind(&row.venue_id);
            b.push_bind(&row.labels);
            b.push_bind(row.players_unfixed);
        });
        builder.push(
            " ON DUPLICATE KEY UPDATE cup_name = VALUES(cup_name), \
             start_date = VALUES(start_date), end_date = VALUES(end_date), \
             duration = VALUES(duration), grade = VALUES(grade), \
             venue_id = VALUES(venue_id), labels = VALUES(labels), \
             players_unfixed = VALUES(players_unfixed)",
        );
        builder.build().execute(&mut *tx).await?;
    }
    Ok(())
}
