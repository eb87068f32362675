//! [`SqliteStore`], the SQLite implementation of [`LegStore`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, TransactionBehavior};

use contrail_core::{
  leg::DynamicRecord,
  live::LiveSnapshot,
  static_data::StaticRecord,
  status::{self, AutoClose, AutoClosure},
  store::{LegListing, LegRead, LegStore},
};

use crate::{
  encode::{
    EncodedLeg, LEG_COLUMNS, RawClosure, RawLeg, RawSnapshot, RawStatic, encode_dt,
    encode_status, encode_uuid, encode_weather,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Contrail leg store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened leg store");
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read legs with `select` (which must project [`LEG_COLUMNS`]) and, when
  /// `close` is given, force-close the silent open ones. The read, the status
  /// flip and the ledger insert share one immediate transaction, so two
  /// concurrent readers cannot both count the same closure.
  async fn read_legs(
    &self,
    select: String,
    params: Vec<String>,
    close: Option<AutoClose>,
  ) -> Result<LegListing> {
    let listing = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let raws = {
          let mut stmt = tx.prepare(&select)?;
          stmt
            .query_map(rusqlite::params_from_iter(params.iter()), RawLeg::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut listing = LegListing::default();
        for raw in raws {
          let mut record = raw.into_record().map_err(in_call)?;
          if let Some(policy) = close
            && let Some(closure) = status::auto_close(&mut record, policy)
            && record_closure(&tx, &record, &closure)?
          {
            listing.closures.push(closure);
          }
          listing.records.push(record);
        }

        tx.commit()?;
        Ok(listing)
      })
      .await?;
    Ok(listing)
  }
}

/// Persist a closure decided by [`status::auto_close`]. Returns `false` when
/// another reader got there first, in which case nothing is counted.
fn record_closure(
  tx: &rusqlite::Transaction<'_>,
  closed: &DynamicRecord,
  closure: &AutoClosure,
) -> tokio_rusqlite::Result<bool> {
  let flipped = tx.execute(
    "UPDATE legs SET status = ?1, last_update = ?2
     WHERE unique_key = ?3 AND status = ?4 AND last_update = ?5",
    rusqlite::params![
      encode_status(closed.status),
      encode_dt(closed.last_update),
      closure.unique_key,
      encode_status(closure.previous_status),
      encode_dt(closure.silent_since),
    ],
  )?;
  if flipped == 0 {
    return Ok(false);
  }

  let logged = tx.execute(
    "INSERT OR IGNORE INTO closures (unique_key, previous_status, silent_since, closed_at)
     VALUES (?1, ?2, ?3, ?4)",
    rusqlite::params![
      closure.unique_key,
      encode_status(closure.previous_status),
      encode_dt(closure.silent_since),
      encode_dt(closure.closed_at),
    ],
  )?;
  Ok(logged == 1)
}

/// Carry a decode failure out of a connection closure.
fn in_call(e: Error) -> tokio_rusqlite::Error { tokio_rusqlite::Error::Other(Box::new(e)) }

const STATIC_COLUMNS: &str = "callsign, airline, origin_code, destination_code, origin_airport, \
                              destination_airport, origin_city, destination_city, commercial";

// ─── LegStore impl ───────────────────────────────────────────────────────────

impl LegStore for SqliteStore {
  type Error = Error;

  // ── Static metadata ───────────────────────────────────────────────────────

  async fn get_static(&self, callsign: &str) -> Result<Option<StaticRecord>> {
    let callsign = callsign.trim().to_uppercase();

    let raw: Option<RawStatic> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {STATIC_COLUMNS} FROM static_flights WHERE callsign = ?1"),
            rusqlite::params![callsign],
            RawStatic::from_row,
          )
          .optional()?)
      })
      .await?;

    Ok(raw.map(RawStatic::into_static))
  }

  async fn upsert_static(&self, record: StaticRecord) -> Result<StaticRecord> {
    let r = record.cleaned();

    let raw: RawStatic = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO static_flights ({STATIC_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (callsign) DO UPDATE SET
               airline             = COALESCE(excluded.airline, static_flights.airline),
               origin_code         = COALESCE(excluded.origin_code, static_flights.origin_code),
               destination_code    = COALESCE(excluded.destination_code, static_flights.destination_code),
               origin_airport      = COALESCE(excluded.origin_airport, static_flights.origin_airport),
               destination_airport = COALESCE(excluded.destination_airport, static_flights.destination_airport),
               origin_city         = COALESCE(excluded.origin_city, static_flights.origin_city),
               destination_city    = COALESCE(excluded.destination_city, static_flights.destination_city),
               commercial          = COALESCE(excluded.commercial, static_flights.commercial)
             RETURNING {STATIC_COLUMNS}"
          ),
          rusqlite::params![
            r.callsign,
            r.airline,
            r.origin_code,
            r.destination_code,
            r.origin_airport,
            r.destination_airport,
            r.origin_city,
            r.destination_city,
            r.commercial,
          ],
          RawStatic::from_row,
        )?)
      })
      .await?;

    Ok(raw.into_static())
  }

  // ── Dynamic records ───────────────────────────────────────────────────────

  async fn latest_leg(
    &self,
    callsign: &str,
    tail_id: &str,
    close: AutoClose,
  ) -> Result<Option<LegRead>> {
    let select = format!(
      "SELECT {LEG_COLUMNS} FROM legs
       WHERE callsign = ?1 AND tail_id = ?2
       ORDER BY flight_date DESC, scheduled_departure DESC
       LIMIT 1"
    );
    let params = vec![callsign.trim().to_uppercase(), tail_id.trim().to_lowercase()];

    let mut listing = self.read_legs(select, params, Some(close)).await?;
    Ok(listing.records.pop().map(|record| LegRead { record, closure: listing.closures.pop() }))
  }

  async fn get_leg(&self, unique_key: &str) -> Result<Option<DynamicRecord>> {
    let key = unique_key.to_owned();

    let raw: Option<RawLeg> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {LEG_COLUMNS} FROM legs WHERE unique_key = ?1"),
            rusqlite::params![key],
            RawLeg::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawLeg::into_record).transpose()
  }

  async fn list_legs(&self, close: Option<AutoClose>) -> Result<LegListing> {
    let select = format!("SELECT {LEG_COLUMNS} FROM legs ORDER BY last_update DESC");
    self.read_legs(select, Vec::new(), close).await
  }

  async fn upsert_leg(&self, record: DynamicRecord) -> Result<DynamicRecord> {
    if !record.status.is_known() {
      return Err(contrail_core::Error::UnknownStatus(record.unique_key()).into());
    }
    let leg = EncodedLeg::from(&record);
    let key = leg.unique_key.clone();

    let raw: Option<RawLeg> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "INSERT INTO legs (unique_key, {LEG_COLUMNS})
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
               ON CONFLICT (unique_key) DO UPDATE SET
                 scheduled_arrival = COALESCE(excluded.scheduled_arrival, legs.scheduled_arrival),
                 actual_departure  = COALESCE(excluded.actual_departure, legs.actual_departure),
                 actual_arrival    = COALESCE(excluded.actual_arrival, legs.actual_arrival),
                 status            = CASE
                                       WHEN legs.status = 'arrived' AND legs.actual_arrival IS NOT NULL
                                       THEN legs.status
                                       ELSE excluded.status
                                     END,
                 last_update       = excluded.last_update
               RETURNING {LEG_COLUMNS}"
            ),
            rusqlite::params![
              leg.unique_key,
              leg.callsign,
              leg.tail_id,
              leg.flight_date,
              leg.scheduled_departure,
              leg.scheduled_arrival,
              leg.actual_departure,
              leg.actual_arrival,
              leg.status,
              leg.last_update,
            ],
            RawLeg::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.ok_or(Error::LegNotStored(key))?.into_record()
  }

  async fn close_stale(&self, close: AutoClose) -> Result<Vec<AutoClosure>> {
    let select = format!(
      "SELECT {LEG_COLUMNS} FROM legs
       WHERE status IN ('departing', 'en route') AND last_update < ?1"
    );
    let listing = self.read_legs(select, vec![encode_dt(close.cutoff())], Some(close)).await?;
    Ok(listing.closures)
  }

  async fn closures(&self) -> Result<Vec<AutoClosure>> {
    let raws: Vec<RawClosure> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT unique_key, previous_status, silent_since, closed_at
           FROM closures ORDER BY closure_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawClosure {
              unique_key:      row.get(0)?,
              previous_status: row.get(1)?,
              silent_since:    row.get(2)?,
              closed_at:       row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClosure::into_closure).collect()
  }

  // ── Live snapshots (append-only) ──────────────────────────────────────────

  async fn append_snapshot(&self, snapshot: LiveSnapshot) -> Result<()> {
    let id_str      = encode_uuid(snapshot.snapshot_id);
    let request_str = encode_uuid(snapshot.request_id);
    let key         = snapshot.identity.unique_key();
    let at_str      = encode_dt(snapshot.observed_at);
    let weather     = encode_weather(&snapshot.weather)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO live_snapshots (
             snapshot_id, request_id, unique_key, observed_at, longitude, latitude,
             baro_altitude, geo_altitude, on_ground, velocity, vertical_rate, weather
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
          rusqlite::params![
            id_str,
            request_str,
            key,
            at_str,
            snapshot.longitude,
            snapshot.latitude,
            snapshot.baro_altitude,
            snapshot.geo_altitude,
            snapshot.on_ground,
            snapshot.velocity,
            snapshot.vertical_rate,
            weather,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn snapshots_for(&self, unique_key: &str) -> Result<Vec<LiveSnapshot>> {
    let key = unique_key.to_owned();

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT snapshot_id, request_id, unique_key, observed_at, longitude, latitude,
                  baro_altitude, geo_altitude, on_ground, velocity, vertical_rate, weather
           FROM live_snapshots
           WHERE unique_key = ?1
           ORDER BY observed_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![key], |row| {
            Ok(RawSnapshot {
              snapshot_id:   row.get(0)?,
              request_id:    row.get(1)?,
              unique_key:    row.get(2)?,
              observed_at:   row.get(3)?,
              longitude:     row.get(4)?,
              latitude:      row.get(5)?,
              baro_altitude: row.get(6)?,
              geo_altitude:  row.get(7)?,
              on_ground:     row.get(8)?,
              velocity:      row.get(9)?,
              vertical_rate: row.get(10)?,
              weather:       row.get(11)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }
}
