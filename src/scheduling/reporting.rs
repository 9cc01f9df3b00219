// src/scheduling/reporting.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ScheduleError,
    models::{AppointmentStatus, Caller},
    scheduling::policy::{authorize, Operation},
    store::{AppointmentFilter, Store},
};

/* ============================================================
   Overview
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverviewRange {
    Today,
    ThisWeek,
}

impl OverviewRange {
    /// Unrecognized values mean "no filter".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "today" => Some(OverviewRange::Today),
            "this_week" => Some(OverviewRange::ThisWeek),
            _ => None,
        }
    }

    pub fn bounds(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            OverviewRange::Today => (today, today),
            OverviewRange::ThisWeek => {
                let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (monday, monday + Duration::days(6))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub canceled: usize,
    pub no_show: usize,
}

pub async fn overview(
    store: &dyn Store,
    caller: &Caller,
    range: Option<OverviewRange>,
    today: NaiveDate,
) -> Result<Overview, ScheduleError> {
    let policy = authorize(caller, Operation::ViewReports)?;

    let mut filter = AppointmentFilter {
        employee_id: policy.owner_filter(caller),
        ..AppointmentFilter::default()
    };
    if let Some(range) = range {
        let (from, to) = range.bounds(today);
        filter.date_from = Some(from);
        filter.date_to = Some(to);
    }

    let rows = store.list_appointments(&filter).await?;
    let count = |status: AppointmentStatus| rows.iter().filter(|a| a.status == status).count();

    Ok(Overview {
        total: rows.len(),
        completed: count(AppointmentStatus::Completed),
        pending: count(AppointmentStatus::Pending),
        canceled: count(AppointmentStatus::Canceled),
        no_show: count(AppointmentStatus::NoShow),
    })
}

/* ============================================================
   Key metrics
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsPeriod {
    Last7Days,
    Last30Days,
    Month { year: i32, month: u32 },
}

impl MetricsPeriod {
    /// `last_7_days`, `last_30_days` or `YYYY-MM`. Anything else is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "last_7_days" => Some(MetricsPeriod::Last7Days),
            "last_30_days" => Some(MetricsPeriod::Last30Days),
            other => {
                let (year, month) = other.split_once('-')?;
                if year.len() != 4 || month.len() != 2 {
                    return None;
                }
                let year: i32 = year.parse().ok()?;
                let month: u32 = month.parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, 1)?;
                Some(MetricsPeriod::Month { year, month })
            }
        }
    }

    pub fn bounds(self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            MetricsPeriod::Last7Days => Some((today - Duration::days(7), today)),
            MetricsPeriod::Last30Days => Some((today - Duration::days(30), today)),
            MetricsPeriod::Month { year, month } => {
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)?
                };
                Some((first, next.pred_opt()?))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyMetrics {
    pub revenue_cents: i64,
    pub appointment_count: i64,
    pub distinct_clients: i64,
}

/// Revenue and volume over completed appointments only.
pub async fn key_metrics(
    store: &dyn Store,
    caller: &Caller,
    period: Option<MetricsPeriod>,
    today: NaiveDate,
) -> Result<KeyMetrics, ScheduleError> {
    let policy = authorize(caller, Operation::ViewReports)?;

    let mut filter = AppointmentFilter {
        employee_id: policy.owner_filter(caller),
        status: Some(AppointmentStatus::Completed),
        ..AppointmentFilter::default()
    };
    if let Some((from, to)) = period.and_then(|p| p.bounds(today)) {
        filter.date_from = Some(from);
        filter.date_to = Some(to);
    }

    let totals = store.appointment_totals(&filter).await?;
    Ok(KeyMetrics {
        revenue_cents: totals.revenue_cents,
        appointment_count: totals.appointment_count,
        distinct_clients: totals.distinct_clients,
    })
}

/* ============================================================
   Billing
   ============================================================ */

pub const MAX_BASIS_POINTS: i64 = 10_000;

/// How the studio's share of each appointment is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "fee_type", rename_all = "snake_case")]
pub enum FeeModel {
    /// Fixed amount per completed appointment.
    Flat { amount_cents: i64 },
    /// Share of the price in basis points (3000 = 30%).
    Percentage { basis_points: i64 },
}

impl FeeModel {
    pub fn from_parts(fee_type: &str, value: i64) -> Result<Self, ScheduleError> {
        match fee_type.trim() {
            "flat" if value >= 0 => Ok(FeeModel::Flat { amount_cents: value }),
            "flat" => Err(ScheduleError::validation("flat fee must be >= 0")),
            "percentage" if (0..=MAX_BASIS_POINTS).contains(&value) => {
                Ok(FeeModel::Percentage { basis_points: value })
            }
            "percentage" => Err(ScheduleError::validation(
                "percentage fee must be between 0 and 10000 basis points",
            )),
            other => Err(ScheduleError::validation(format!(
                "unknown fee_type {other:?}; expected flat or percentage"
            ))),
        }
    }

    /// Studio's cut of one appointment. Percentages round half up to the cent.
    pub fn shop_cut(&self, price_cents: i64) -> i64 {
        match *self {
            FeeModel::Flat { amount_cents } => amount_cents,
            FeeModel::Percentage { basis_points } => {
                // Widened so price * basis points cannot overflow.
                let cut = (i128::from(price_cents) * i128::from(basis_points)
                    + i128::from(MAX_BASIS_POINTS / 2))
                    / i128::from(MAX_BASIS_POINTS);
                i64::try_from(cut).unwrap_or(i64::MAX)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BillingRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl BillingRange {
    /// Defaults to month-to-date.
    pub fn resolve(self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ScheduleError> {
        let start = self.start.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
        let end = self.end.unwrap_or(today);
        if start > end {
            return Err(ScheduleError::validation("start date must not be after end date"));
        }
        Ok((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingLine {
    pub appointment_id: Uuid,
    pub client_name: String,
    pub date: NaiveDate,
    pub price_cents: i64,
    pub shop_cut_cents: i64,
    pub employee_cut_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeBilling {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub appointment_count: usize,
    pub gross_cents: i64,
    pub shop_fee_cents: i64,
    pub net_payout_cents: i64,
    pub appointments: Vec<BillingLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub fee: FeeModel,
    pub total_revenue_cents: i64,
    pub total_shop_fee_cents: i64,
    pub total_payout_cents: i64,
    pub employees: Vec<EmployeeBilling>,
}

/// Per-employee payout breakdown over completed appointments. Admin only.
pub async fn billing_summary(
    store: &dyn Store,
    caller: &Caller,
    range: BillingRange,
    fee: FeeModel,
    today: NaiveDate,
) -> Result<BillingSummary, ScheduleError> {
    authorize(caller, Operation::ViewBilling)?;
    let (start, end) = range.resolve(today)?;

    let filter = AppointmentFilter {
        status: Some(AppointmentStatus::Completed),
        date_from: Some(start),
        date_to: Some(end),
        ..AppointmentFilter::default()
    };
    let rows = store.list_appointments(&filter).await?;

    let mut client_ids: Vec<Uuid> = rows.iter().map(|a| a.client_id).collect();
    client_ids.sort();
    client_ids.dedup();
    let client_names: HashMap<Uuid, String> = store
        .get_clients(&client_ids)
        .await?
        .into_iter()
        .map(|c| (c.client_id, c.full_name()))
        .collect();

    // rows arrive sorted by date and start time, so lines stay in order
    let mut grouped: BTreeMap<Uuid, Vec<BillingLine>> = BTreeMap::new();
    for a in &rows {
        let shop_cut_cents = fee.shop_cut(a.price_cents);
        grouped.entry(a.employee_id).or_default().push(BillingLine {
            appointment_id: a.appointment_id,
            client_name: client_names
                .get(&a.client_id)
                .cloned()
                .unwrap_or_else(|| "Unknown client".into()),
            date: a.date,
            price_cents: a.price_cents,
            shop_cut_cents,
            employee_cut_cents: a.price_cents - shop_cut_cents,
        });
    }

    let employee_ids: Vec<Uuid> = grouped.keys().copied().collect();
    let employee_names: HashMap<Uuid, String> = store
        .get_users(&employee_ids)
        .await?
        .into_iter()
        .map(|u| (u.user_id, u.display_name))
        .collect();

    let mut employees: Vec<EmployeeBilling> = grouped
        .into_iter()
        .map(|(employee_id, lines)| {
            let gross_cents: i64 = lines.iter().map(|l| l.price_cents).sum();
            let shop_fee_cents: i64 = lines.iter().map(|l| l.shop_cut_cents).sum();
            EmployeeBilling {
                employee_id,
                employee_name: employee_names
                    .get(&employee_id)
                    .cloned()
                    .unwrap_or_else(|| employee_id.to_string()),
                appointment_count: lines.len(),
                gross_cents,
                shop_fee_cents,
                net_payout_cents: gross_cents - shop_fee_cents,
                appointments: lines,
            }
        })
        .collect();
    employees.sort_by(|a, b| a.employee_name.cmp(&b.employee_name));

    let summary = BillingSummary {
        start,
        end,
        fee,
        total_revenue_cents: employees.iter().map(|e| e.gross_cents).sum(),
        total_shop_fee_cents: employees.iter().map(|e| e.shop_fee_cents).sum(),
        total_payout_cents: employees.iter().map(|e| e.net_payout_cents).sum(),
        employees,
    };

    tracing::info!(
        %start,
        %end,
        employees = summary.employees.len(),
        revenue_cents = summary.total_revenue_cents,
        "billing summary computed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAppointment, Role, ServiceName};
    use crate::store::memory::MemoryStore;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Studio {
        store: MemoryStore,
        admin: Caller,
        service_id: Uuid,
    }

    fn studio() -> Studio {
        let store = MemoryStore::default();
        let admin = Caller::admin(store.add_user("boss", Role::Admin));
        let service_id = store.add_service(ServiceName::CustomTattoo, 10_000);
        Studio { store, admin, service_id }
    }

    async fn seed(
        s: &Studio,
        employee_id: Uuid,
        client_id: Uuid,
        date: NaiveDate,
        hour: u32,
        price_cents: i64,
        status: AppointmentStatus,
    ) {
        s.store
            .insert_appointment(NewAppointment {
                client_id,
                employee_id,
                service_id: s.service_id,
                date,
                start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
                price_cents,
                status,
                requires_approval: false,
                notes: None,
            })
            .await
            .unwrap();
    }

    #[test]
    fn week_starts_on_monday() {
        // 2025-03-06 is a Thursday
        let (from, to) = OverviewRange::ThisWeek.bounds(d(2025, 3, 6));
        assert_eq!(from, d(2025, 3, 3));
        assert_eq!(to, d(2025, 3, 9));

        let (from, _) = OverviewRange::ThisWeek.bounds(d(2025, 3, 3));
        assert_eq!(from, d(2025, 3, 3));
    }

    #[test]
    fn metrics_period_parsing() {
        assert_eq!(MetricsPeriod::parse("last_7_days"), Some(MetricsPeriod::Last7Days));
        assert_eq!(
            MetricsPeriod::parse("2025-04"),
            Some(MetricsPeriod::Month { year: 2025, month: 4 })
        );
        assert_eq!(MetricsPeriod::parse("2025-13"), None);
        assert_eq!(MetricsPeriod::parse("2025-4"), None);
        assert_eq!(MetricsPeriod::parse("april"), None);
        assert_eq!(
            MetricsPeriod::Month { year: 2024, month: 12 }.bounds(d(2025, 1, 1)),
            Some((d(2024, 12, 1), d(2024, 12, 31)))
        );
        assert_eq!(
            MetricsPeriod::Month { year: 2024, month: 2 }.bounds(d(2025, 1, 1)),
            Some((d(2024, 2, 1), d(2024, 2, 29)))
        );
    }

    #[test]
    fn fee_types_are_validated() {
        assert_eq!(FeeModel::from_parts("flat", 2_000).unwrap(), FeeModel::Flat { amount_cents: 2_000 });
        assert_matches!(FeeModel::from_parts("tip", 10), Err(ScheduleError::Validation(_)));
        assert_matches!(FeeModel::from_parts("percentage", 10_001), Err(ScheduleError::Validation(_)));
        assert_matches!(FeeModel::from_parts("flat", -1), Err(ScheduleError::Validation(_)));
    }

    #[test]
    fn percentage_cut_rounds_half_up() {
        let fee = FeeModel::Percentage { basis_points: 2_500 };
        assert_eq!(fee.shop_cut(10_000), 2_500);
        assert_eq!(fee.shop_cut(10_002), 2_501);
        assert_eq!(fee.shop_cut(1), 0);
        assert_eq!(fee.shop_cut(2), 1);
    }

    #[test]
    fn percentage_cut_of_a_huge_price_does_not_overflow() {
        let fee = FeeModel::Percentage { basis_points: 3_000 };
        assert_eq!(fee.shop_cut(4_000_000_000_000_000), 1_200_000_000_000_000);
        let everything = FeeModel::Percentage { basis_points: MAX_BASIS_POINTS };
        assert_eq!(everything.shop_cut(i64::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn overview_counts_statuses_in_range() {
        let s = studio();
        let e = s.store.add_user("ink", Role::Employee);
        let c = s.store.add_client("Ana", Some(e));
        let today = d(2025, 3, 6);
        seed(&s, e, c, today, 9, 100, AppointmentStatus::Completed).await;
        seed(&s, e, c, today, 11, 100, AppointmentStatus::Pending).await;
        seed(&s, e, c, d(2025, 3, 4), 9, 100, AppointmentStatus::NoShow).await;
        seed(&s, e, c, d(2025, 2, 20), 9, 100, AppointmentStatus::Canceled).await;
        seed(&s, e, c, d(2025, 2, 20), 12, 100, AppointmentStatus::Confirmed).await;

        let all = overview(&s.store, &s.admin, None, today).await.unwrap();
        assert_eq!(
            all,
            Overview { total: 5, completed: 1, pending: 1, canceled: 1, no_show: 1 }
        );

        let day = overview(&s.store, &s.admin, Some(OverviewRange::Today), today).await.unwrap();
        assert_eq!(day.total, 2);

        let week = overview(&s.store, &s.admin, Some(OverviewRange::ThisWeek), today).await.unwrap();
        assert_eq!(week.total, 3);
        assert_eq!(week.no_show, 1);
    }

    #[tokio::test]
    async fn month_filter_keeps_only_completed_in_that_month() {
        let s = studio();
        let e = s.store.add_user("ink", Role::Employee);
        let ana = s.store.add_client("Ana", Some(e));
        let bo = s.store.add_client("Bo", Some(e));
        seed(&s, e, ana, d(2025, 4, 1), 9, 10_000, AppointmentStatus::Completed).await;
        seed(&s, e, ana, d(2025, 4, 30), 9, 5_000, AppointmentStatus::Completed).await;
        seed(&s, e, bo, d(2025, 4, 15), 9, 7_000, AppointmentStatus::Completed).await;
        seed(&s, e, bo, d(2025, 4, 16), 9, 9_999, AppointmentStatus::Confirmed).await;
        seed(&s, e, bo, d(2025, 3, 31), 9, 1_000, AppointmentStatus::Completed).await;
        seed(&s, e, bo, d(2025, 5, 1), 9, 1_000, AppointmentStatus::Completed).await;

        let today = d(2025, 6, 1);
        let april = key_metrics(&s.store, &s.admin, MetricsPeriod::parse("2025-04"), today).await.unwrap();
        assert_eq!(
            april,
            KeyMetrics { revenue_cents: 22_000, appointment_count: 3, distinct_clients: 2 }
        );

        let ignored = key_metrics(&s.store, &s.admin, MetricsPeriod::parse("2025-99"), today).await.unwrap();
        assert_eq!(ignored.appointment_count, 5);
    }

    #[tokio::test]
    async fn employees_only_see_their_own_metrics() {
        let s = studio();
        let a = s.store.add_user("a", Role::Employee);
        let b = s.store.add_user("b", Role::Employee);
        let c = s.store.add_client("Ana", None);
        let today = d(2025, 4, 10);
        seed(&s, a, c, d(2025, 4, 8), 9, 3_000, AppointmentStatus::Completed).await;
        seed(&s, b, c, d(2025, 4, 8), 9, 4_000, AppointmentStatus::Completed).await;

        let mine = key_metrics(&s.store, &Caller::employee(a), Some(MetricsPeriod::Last7Days), today)
            .await
            .unwrap();
        assert_eq!(mine.revenue_cents, 3_000);

        let counts = overview(&s.store, &Caller::employee(b), None, today).await.unwrap();
        assert_eq!(counts.total, 1);
    }

    #[tokio::test]
    async fn flat_fee_payouts_and_fees_add_up_to_revenue() {
        let s = studio();
        let a = s.store.add_user("alex", Role::Employee);
        let b = s.store.add_user("blair", Role::Employee);
        let ana = s.store.add_client("Ana", None);
        let bo = s.store.add_client("Bo", None);
        seed(&s, a, ana, d(2025, 4, 3), 9, 10_000, AppointmentStatus::Completed).await;
        seed(&s, a, bo, d(2025, 4, 1), 9, 15_050, AppointmentStatus::Completed).await;
        seed(&s, b, bo, d(2025, 4, 2), 9, 8_000, AppointmentStatus::Completed).await;
        seed(&s, b, bo, d(2025, 4, 2), 12, 8_000, AppointmentStatus::Canceled).await;

        let fee = FeeModel::Flat { amount_cents: 2_000 };
        let range = BillingRange { start: Some(d(2025, 4, 1)), end: Some(d(2025, 4, 30)) };
        let summary = billing_summary(&s.store, &s.admin, range, fee, d(2025, 5, 1)).await.unwrap();

        assert_eq!(summary.employees.len(), 2);
        for e in &summary.employees {
            let prices: i64 = e.appointments.iter().map(|l| l.price_cents).sum();
            assert_eq!(e.net_payout_cents + e.shop_fee_cents, prices);
            assert_eq!(e.shop_fee_cents, 2_000 * e.appointment_count as i64);
        }
        assert_eq!(summary.total_revenue_cents, 33_050);
        assert_eq!(summary.total_shop_fee_cents, 6_000);
        assert_eq!(summary.total_payout_cents + summary.total_shop_fee_cents, 33_050);

        let alex = &summary.employees[0];
        assert_eq!(alex.employee_name, "alex");
        assert_eq!(alex.appointments[0].date, d(2025, 4, 1));
        assert_eq!(alex.appointments[0].client_name, "Bo Doe");
        assert_eq!(alex.appointments[0].employee_cut_cents, 13_050);
    }

    #[tokio::test]
    async fn percentage_fee_stays_exact_per_employee() {
        let s = studio();
        let a = s.store.add_user("alex", Role::Employee);
        let c = s.store.add_client("Ana", None);
        for (hour, price) in [(9, 3_333), (11, 1_001), (13, 7)] {
            seed(&s, a, c, d(2025, 4, 2), hour, price, AppointmentStatus::Completed).await;
        }

        let fee = FeeModel::Percentage { basis_points: 3_000 };
        let summary = billing_summary(&s.store, &s.admin, BillingRange::default(), fee, d(2025, 4, 20))
            .await
            .unwrap();

        let alex = &summary.employees[0];
        assert_eq!(alex.gross_cents, 4_341);
        assert_eq!(alex.shop_fee_cents, 1_000 + 300 + 2);
        assert_eq!(alex.net_payout_cents + alex.shop_fee_cents, alex.gross_cents);
        assert_eq!(summary.start, d(2025, 4, 1));
    }

    #[tokio::test]
    async fn billing_is_admin_only_and_checks_the_range() {
        let s = studio();
        let e = Caller::employee(s.store.add_user("ink", Role::Employee));
        let fee = FeeModel::Flat { amount_cents: 0 };
        assert_matches!(
            billing_summary(&s.store, &e, BillingRange::default(), fee, d(2025, 4, 2)).await,
            Err(ScheduleError::Permission(_))
        );

        let backwards = BillingRange { start: Some(d(2025, 4, 10)), end: Some(d(2025, 4, 1)) };
        assert_matches!(
            billing_summary(&s.store, &s.admin, backwards, fee, d(2025, 4, 20)).await,
            Err(ScheduleError::Validation(_))
        );
    }
}
