use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use wingdesk_core::{
    Agent, AgentDebt, Booking, CoreError, CoreResult, Discount, Flight, FlightGuide,
    FlightPriceHistory, Passenger, Refill, Repository, Ticket, UnitOfWork,
};
use wingdesk_shared::Masked;

/// Postgres-backed store. One unit of work is one transaction; mutable rows
/// are read with `FOR UPDATE` so concurrent writers on the same flight,
/// booking or agent queue up behind each other.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn begin(&self) -> CoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(|e| CoreError::persistence("begin", e))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn db(operation: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| CoreError::persistence(operation, e)
}

fn expect_one(operation: &'static str, id: Uuid, rows_affected: u64) -> CoreResult<()> {
    if rows_affected == 0 {
        return Err(CoreError::persistence(operation, format!("row {} does not exist", id)));
    }
    Ok(())
}

// Internal row structs for type-safe querying

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    guide_id: Uuid,
    from_airport_id: Uuid,
    to_airport_id: Uuid,
    departure_at: DateTime<Utc>,
    arrival_at: DateTime<Utc>,
    price: i64,
    currency: String,
    total_seats: i32,
    left_seats: i32,
    on_sale: DateTime<Utc>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<FlightRow> for Flight {
    fn from(row: FlightRow) -> Self {
        Flight {
            id: row.id,
            guide_id: row.guide_id,
            from_airport_id: row.from_airport_id,
            to_airport_id: row.to_airport_id,
            departure_at: row.departure_at,
            arrival_at: row.arrival_at,
            price: row.price,
            currency: row.currency,
            total_seats: row.total_seats,
            left_seats: row.left_seats,
            on_sale: row.on_sale,
            created_by: row.created_by,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GuideRow {
    id: Uuid,
    carrier_code: String,
    luggage_fee: i64,
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    name: String,
    balance: i64,
    discount_id: Option<Uuid>,
    is_on_credit: bool,
    block_date: Option<DateTime<Utc>>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Agent {
            id: row.id,
            name: row.name,
            balance: row.balance,
            discount_id: row.discount_id,
            is_on_credit: row.is_on_credit,
            block_date: row.block_date,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    flight_id: Uuid,
    agent_id: Uuid,
    hard_block: i32,
    soft_block: i32,
    price: i64,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            flight_id: row.flight_id,
            agent_id: row.agent_id,
            hard_block: row.hard_block,
            soft_block: row.soft_block,
            price: row.price,
            created_by: row.created_by,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    number: String,
    flight_id: Uuid,
    agent_id: Option<Uuid>,
    first_name: String,
    last_name: String,
    document_number: String,
    birth_date: Option<NaiveDate>,
    phone: Option<String>,
    luggage: bool,
    price: i64,
    is_booked: bool,
    block: Option<String>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = CoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let block = match row.block {
            Some(block) => Some(block.parse().map_err(|e| CoreError::persistence("load_ticket", e))?),
            None => None,
        };
        Ok(Ticket {
            id: row.id,
            number: row.number,
            flight_id: row.flight_id,
            agent_id: row.agent_id,
            passenger: Passenger {
                first_name: row.first_name,
                last_name: row.last_name,
                document_number: Masked::new(row.document_number),
                birth_date: row.birth_date,
                phone: row.phone,
            },
            luggage: row.luggage,
            price: row.price,
            is_booked: row.is_booked,
            block,
            status: row.status.parse().map_err(|e| CoreError::persistence("load_ticket", e))?,
            created_by: row.created_by,
            created_at: row.created_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RefillRow {
    id: Uuid,
    agent_id: Uuid,
    receiver_id: Uuid,
    amount: i64,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<RefillRow> for Refill {
    fn from(row: RefillRow) -> Self {
        Refill {
            id: row.id,
            agent_id: row.agent_id,
            receiver_id: row.receiver_id,
            amount: row.amount,
            comment: row.comment,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DebtRow {
    id: Uuid,
    agent_id: Uuid,
    flight_id: Option<Uuid>,
    ticket_id: Option<Uuid>,
    refill_id: Option<Uuid>,
    debt_type: String,
    amount: i64,
    comment: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<DebtRow> for AgentDebt {
    type Error = CoreError;

    fn try_from(row: DebtRow) -> Result<Self, Self::Error> {
        Ok(AgentDebt {
            id: row.id,
            agent_id: row.agent_id,
            flight_id: row.flight_id,
            ticket_id: row.ticket_id,
            refill_id: row.refill_id,
            debt_type: row.debt_type.parse().map_err(|e| CoreError::persistence("load_debt", e))?,
            amount: row.amount,
            comment: row.comment,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PriceHistoryRow {
    id: Uuid,
    flight_id: Uuid,
    price: i64,
    currency: String,
    comment: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

const FLIGHT_COLUMNS: &str = "id, guide_id, from_airport_id, to_airport_id, departure_at, arrival_at, \
     price, currency, total_seats, left_seats, on_sale, created_by, created_at, deleted_at";

/// Every mutable flight column; `id`, `created_by` and `created_at` are fixed.
const UPDATE_FLIGHT_SQL: &str = "UPDATE flights \
     SET guide_id = $2, from_airport_id = $3, to_airport_id = $4, departure_at = $5, arrival_at = $6, \
     price = $7, currency = $8, total_seats = $9, left_seats = $10, on_sale = $11, deleted_at = $12 \
     WHERE id = $1";

const DEBT_COLUMNS: &str =
    "id, agent_id, flight_id, ticket_id, refill_id, debt_type, amount, comment, created_by, created_at";

const BOOKING_COLUMNS: &str =
    "id, flight_id, agent_id, hard_block, soft_block, price, created_by, created_at, deleted_at";

const TICKET_COLUMNS: &str = "id, number, flight_id, agent_id, first_name, last_name, document_number, \
     birth_date, phone, luggage, price, is_booked, block, status, created_by, created_at, cancelled_at";

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn flight(&mut self, id: Uuid) -> CoreResult<Option<Flight>> {
        let sql = format!("SELECT {} FROM flights WHERE id = $1 FOR UPDATE", FLIGHT_COLUMNS);
        let row: Option<FlightRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db("load_flight"))?;
        Ok(row.map(Flight::from))
    }

    async fn flight_guide(&mut self, id: Uuid) -> CoreResult<Option<FlightGuide>> {
        let row: Option<GuideRow> =
            sqlx::query_as("SELECT id, carrier_code, luggage_fee FROM flight_guides WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db("load_flight_guide"))?;
        Ok(row.map(|r| FlightGuide {
            id: r.id,
            carrier_code: r.carrier_code,
            luggage_fee: r.luggage_fee,
        }))
    }

    async fn agent(&mut self, id: Uuid) -> CoreResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT id, name, balance, discount_id, is_on_credit, block_date FROM agents WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db("load_agent"))?;
        Ok(row.map(Agent::from))
    }

    async fn discount(&mut self, id: Uuid) -> CoreResult<Option<Discount>> {
        let row: Option<(Uuid, String, i64)> =
            sqlx::query_as("SELECT id, name, amount FROM discounts WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db("load_discount"))?;
        Ok(row.map(|(id, name, amount)| Discount { id, name, amount }))
    }

    async fn booking(&mut self, id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db("load_booking"))?;
        Ok(row.map(Booking::from))
    }

    async fn booking_keys(&mut self, id: Uuid) -> CoreResult<Option<(Uuid, Uuid)>> {
        let row: Option<(Uuid, Uuid)> = sqlx::query_as("SELECT flight_id, agent_id FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db("load_booking_keys"))?;
        Ok(row)
    }

    async fn active_booking(&mut self, agent_id: Uuid, flight_id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE agent_id = $1 AND flight_id = $2 AND deleted_at IS NULL FOR UPDATE",
            BOOKING_COLUMNS
        );
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(agent_id)
            .bind(flight_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db("load_active_booking"))?;
        Ok(row.map(Booking::from))
    }

    async fn active_bookings(&mut self, flight_id: Uuid) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE flight_id = $1 AND deleted_at IS NULL",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(flight_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db("list_active_bookings"))?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    async fn ticket(&mut self, id: Uuid) -> CoreResult<Option<Ticket>> {
        let sql = format!("SELECT {} FROM tickets WHERE id = $1 FOR UPDATE", TICKET_COLUMNS);
        let row: Option<TicketRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db("load_ticket"))?;
        row.map(Ticket::try_from).transpose()
    }

    async fn active_tickets(&mut self, flight_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {} FROM tickets WHERE flight_id = $1 AND status = 'active' AND cancelled_at IS NULL",
            TICKET_COLUMNS
        );
        let rows: Vec<TicketRow> = sqlx::query_as(&sql)
            .bind(flight_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db("list_active_tickets"))?;
        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn refill(&mut self, id: Uuid) -> CoreResult<Option<Refill>> {
        let row: Option<RefillRow> = sqlx::query_as(
            "SELECT id, agent_id, receiver_id, amount, comment, created_at, deleted_at FROM refills WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db("load_refill"))?;
        Ok(row.map(Refill::from))
    }

    async fn debts_for_agent(&mut self, agent_id: Uuid) -> CoreResult<Vec<AgentDebt>> {
        let sql = format!(
            "SELECT {} FROM agent_debts WHERE agent_id = $1 ORDER BY created_at",
            DEBT_COLUMNS
        );
        let rows: Vec<DebtRow> = sqlx::query_as(&sql)
            .bind(agent_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db("list_debts"))?;
        rows.into_iter().map(AgentDebt::try_from).collect()
    }

    async fn price_history(&mut self, flight_id: Uuid) -> CoreResult<Vec<FlightPriceHistory>> {
        let rows: Vec<PriceHistoryRow> = sqlx::query_as(
            r#"
            SELECT id, flight_id, price, currency, comment, created_by, created_at
            FROM flight_price_history
            WHERE flight_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(flight_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db("list_price_history"))?;
        Ok(rows
            .into_iter()
            .map(|r| FlightPriceHistory {
                id: r.id,
                flight_id: r.flight_id,
                price: r.price,
                currency: r.currency,
                comment: r.comment,
                created_by: r.created_by,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn insert_flight(&mut self, flight: &Flight) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO flights (id, guide_id, from_airport_id, to_airport_id, departure_at, arrival_at,
                                 price, currency, total_seats, left_seats, on_sale, created_by, created_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(flight.id)
        .bind(flight.guide_id)
        .bind(flight.from_airport_id)
        .bind(flight.to_airport_id)
        .bind(flight.departure_at)
        .bind(flight.arrival_at)
        .bind(flight.price)
        .bind(&flight.currency)
        .bind(flight.total_seats)
        .bind(flight.left_seats)
        .bind(flight.on_sale)
        .bind(flight.created_by)
        .bind(flight.created_at)
        .bind(flight.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db("insert_flight"))?;
        Ok(())
    }

    async fn update_flight(&mut self, flight: &Flight) -> CoreResult<()> {
        let result = sqlx::query(UPDATE_FLIGHT_SQL)
            .bind(flight.id)
            .bind(flight.guide_id)
            .bind(flight.from_airport_id)
            .bind(flight.to_airport_id)
            .bind(flight.departure_at)
            .bind(flight.arrival_at)
            .bind(flight.price)
            .bind(&flight.currency)
            .bind(flight.total_seats)
            .bind(flight.left_seats)
            .bind(flight.on_sale)
            .bind(flight.deleted_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db("update_flight"))?;
        expect_one("update_flight", flight.id, result.rows_affected())
    }

    async fn update_agent(&mut self, agent: &Agent) -> CoreResult<()> {
        let result = sqlx::query("UPDATE agents SET balance = $2 WHERE id = $1")
            .bind(agent.id)
            .bind(agent.balance)
            .execute(&mut *self.tx)
            .await
            .map_err(db("update_agent"))?;
        expect_one("update_agent", agent.id, result.rows_affected())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO bookings (id, flight_id, agent_id, hard_block, soft_block, price, created_by, created_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(booking.flight_id)
        .bind(booking.agent_id)
        .bind(booking.hard_block)
        .bind(booking.soft_block)
        .bind(booking.price)
        .bind(booking.created_by)
        .bind(booking.created_at)
        .bind(booking.deleted_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            // bookings_one_active_per_agent
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(CoreError::Conflict(format!(
                "agent {} already holds a booking on flight {}",
                booking.agent_id, booking.flight_id
            ))),
            Err(e) => Err(CoreError::persistence("insert_booking", e)),
        }
    }

    async fn update_booking(&mut self, booking: &Booking) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET hard_block = $2, soft_block = $3, deleted_at = $4 WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.hard_block)
        .bind(booking.soft_block)
        .bind(booking.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db("update_booking"))?;
        expect_one("update_booking", booking.id, result.rows_affected())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> CoreResult<()> {
        let sql = format!(
            "INSERT INTO tickets ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            TICKET_COLUMNS
        );
        sqlx::query(&sql)
            .bind(ticket.id)
            .bind(&ticket.number)
            .bind(ticket.flight_id)
            .bind(ticket.agent_id)
            .bind(&ticket.passenger.first_name)
            .bind(&ticket.passenger.last_name)
            .bind(ticket.passenger.document_number.expose())
            .bind(ticket.passenger.birth_date)
            .bind(&ticket.passenger.phone)
            .bind(ticket.luggage)
            .bind(ticket.price)
            .bind(ticket.is_booked)
            .bind(ticket.block.map(|b| b.as_str()))
            .bind(ticket.status.as_str())
            .bind(ticket.created_by)
            .bind(ticket.created_at)
            .bind(ticket.cancelled_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db("insert_ticket"))?;
        Ok(())
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET first_name = $2, last_name = $3, document_number = $4, birth_date = $5, phone = $6,
                luggage = $7, price = $8, is_booked = $9, block = $10, status = $11, cancelled_at = $12
            WHERE id = $1
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.passenger.first_name)
        .bind(&ticket.passenger.last_name)
        .bind(ticket.passenger.document_number.expose())
        .bind(ticket.passenger.birth_date)
        .bind(&ticket.passenger.phone)
        .bind(ticket.luggage)
        .bind(ticket.price)
        .bind(ticket.is_booked)
        .bind(ticket.block.map(|b| b.as_str()))
        .bind(ticket.status.as_str())
        .bind(ticket.cancelled_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db("update_ticket"))?;
        expect_one("update_ticket", ticket.id, result.rows_affected())
    }

    async fn insert_refill(&mut self, refill: &Refill) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refills (id, agent_id, receiver_id, amount, comment, created_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(refill.id)
        .bind(refill.agent_id)
        .bind(refill.receiver_id)
        .bind(refill.amount)
        .bind(&refill.comment)
        .bind(refill.created_at)
        .bind(refill.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db("insert_refill"))?;
        Ok(())
    }

    async fn update_refill(&mut self, refill: &Refill) -> CoreResult<()> {
        let result = sqlx::query("UPDATE refills SET amount = $2, comment = $3, deleted_at = $4 WHERE id = $1")
            .bind(refill.id)
            .bind(refill.amount)
            .bind(&refill.comment)
            .bind(refill.deleted_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db("update_refill"))?;
        expect_one("update_refill", refill.id, result.rows_affected())
    }

    async fn append_debt(&mut self, debt: &AgentDebt) -> CoreResult<()> {
        let sql = format!(
            "INSERT INTO agent_debts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            DEBT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(debt.id)
            .bind(debt.agent_id)
            .bind(debt.flight_id)
            .bind(debt.ticket_id)
            .bind(debt.refill_id)
            .bind(debt.debt_type.as_str())
            .bind(debt.amount)
            .bind(&debt.comment)
            .bind(debt.created_by)
            .bind(debt.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db("append_debt"))?;
        Ok(())
    }

    async fn append_price_history(&mut self, entry: &FlightPriceHistory) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO flight_price_history (id, flight_id, price, currency, comment, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.flight_id)
        .bind(entry.price)
        .bind(&entry.currency)
        .bind(&entry.comment)
        .bind(entry.created_by)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db("append_price_history"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.map_err(db("commit"))
    }
}
