//! User-facing Portuguese reply catalog. Every outbound string the flows
//! send lives here so wording changes never touch flow logic.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use agendai_core::resolver::EventCandidate;

pub const HELP: &str = "Eu sou sua assistente de agenda! Você pode me pedir coisas como:\n\
    • *agenda de amanhã* — ver seus compromissos\n\
    • *marca reunião com o contador sexta às 10h* — criar um evento\n\
    • *remarca o dentista para 15/12* — mudar um evento\n\
    • *cancela a audiência* — cancelar um evento\n\
    Também entendo áudios. 🎙️";

pub const OUT_OF_SCOPE: &str =
    "Eu só consigo ajudar com a sua agenda: marcar, consultar, remarcar e cancelar compromissos. \
     Envie *ajuda* para ver exemplos.";

pub const SETUP_PROMPT: &str =
    "Antes de começar, preciso de acesso ao seu calendário. Envie:\n\
     *conectar <token do calendário>*\n\
     Opcionalmente inclua também sua base de anotações:\n\
     *conectar <token do calendário> <token:base>*";

pub const CONNECT_USAGE: &str =
    "Para vincular seu calendário, envie *conectar <token do calendário>*. \
     Para vincular também a base de anotações: *conectar <token> <token:base>*.";

pub const CONNECTED: &str = "Pronto! Seu calendário está vinculado. Pode me pedir sua agenda ou marcar um compromisso. ✅";

pub const NO_DATE_PROMPT: &str =
    "Entendi que você quer marcar algo, mas não consegui identificar a data. \
     Pode repetir com o dia? Por exemplo: *reunião com o contador dia 30/12 às 10h*.";

pub const ASK_WHICH_EVENT: &str = "Qual destes compromissos você quer dizer?";

pub const ASK_NEW_TIME: &str =
    "Para quando você quer remarcar? Me diga a nova data ou horário, por exemplo *para 15/12 às 9h*.";

pub fn greeting(display_name: Option<&str>) -> String {
    match display_name {
        Some(name) => format!(
            "Oi, {name}! 👋 Sou sua assistente de agenda. Envie *ajuda* para ver o que eu faço."
        ),
        None => "Oi! 👋 Sou sua assistente de agenda. Envie *ajuda* para ver o que eu faço."
            .to_owned(),
    }
}

pub fn unsupported_kind(kind: &str) -> String {
    format!(
        "Ainda não consigo processar mensagens do tipo *{kind}*. \
         Por enquanto entendo texto e áudio."
    )
}

/// `segunda, 15/12 às 14h30` for timed events, `segunda, 15/12 (dia inteiro)`
/// for all-day ones. Weekday names stay in Portuguese by hand; chrono's
/// locale support is not worth the dependency for seven words.
pub fn format_local(start: DateTime<Utc>, tz: Tz, all_day: bool) -> String {
    let local = start.with_timezone(&tz);
    let weekday = weekday_pt(local.format("%u").to_string().as_str());
    let date = local.format("%d/%m");
    if all_day {
        format!("{weekday}, {date} (dia inteiro)")
    } else {
        let minute = local.format("%M").to_string();
        if minute == "00" {
            format!("{weekday}, {date} às {}h", local.format("%H"))
        } else {
            format!("{weekday}, {date} às {}h{minute}", local.format("%H"))
        }
    }
}

fn weekday_pt(iso_weekday: &str) -> &'static str {
    match iso_weekday {
        "1" => "segunda",
        "2" => "terça",
        "3" => "quarta",
        "4" => "quinta",
        "5" => "sexta",
        "6" => "sábado",
        _ => "domingo",
    }
}

pub fn scheduled(title: &str, start: DateTime<Utc>, tz: Tz, all_day: bool, reminder: bool) -> String {
    let when = format_local(start, tz, all_day);
    let mut reply = format!("Agendado: *{title}* — {when}. ✅");
    if reminder {
        reply.push_str("\nVou te lembrar um pouco antes. ⏰");
    }
    reply
}

pub fn scheduled_locally_only(title: &str, start: DateTime<Utc>, tz: Tz, all_day: bool) -> String {
    let when = format_local(start, tz, all_day);
    format!(
        "Anotei *{title}* — {when}, mas não consegui gravar no seu calendário agora. \
         Vou manter o registro aqui e você pode tentar de novo mais tarde."
    )
}

pub fn rescheduled(title: &str, new_start: DateTime<Utc>, tz: Tz, all_day: bool) -> String {
    format!("Remarcado: *{title}* agora é {}. ✅", format_local(new_start, tz, all_day))
}

pub fn cancelled(title: &str) -> String {
    format!("Cancelado: *{title}*. ✅")
}

pub fn agenda(candidates: &[EventCandidate], tz: Tz, day: Option<NaiveDate>) -> String {
    if candidates.is_empty() {
        return match day {
            Some(day) => format!("Você não tem compromissos em {}.", day.format("%d/%m")),
            None => "Você não tem compromissos futuros. Agenda livre! 🎉".to_owned(),
        };
    }

    let mut reply = match day {
        Some(day) => format!("Sua agenda de {}:\n", day.format("%d/%m")),
        None => "Seus próximos compromissos:\n".to_owned(),
    };
    for candidate in candidates {
        reply.push_str(&format!(
            "• *{}* — {}\n",
            candidate.title,
            format_local(candidate.start, tz, candidate.all_day)
        ));
    }
    reply.trim_end().to_owned()
}

/// Numbered listing used when the resolver could not settle on one event.
pub fn candidate_listing(candidates: &[EventCandidate], tz: Tz) -> String {
    let mut reply = format!("{ASK_WHICH_EVENT}\n");
    for (index, candidate) in candidates.iter().enumerate() {
        reply.push_str(&format!(
            "{}. *{}* — {}\n",
            index + 1,
            candidate.title,
            format_local(candidate.start, tz, candidate.all_day)
        ));
    }
    reply.push_str("Responda com o número ou o nome do compromisso.");
    reply
}

pub const NO_UPCOMING_TO_TOUCH: &str =
    "Não encontrei nenhum compromisso futuro para alterar ou cancelar.";

pub fn bulk_cancelled(titles: &[String], failed: usize, day: NaiveDate) -> String {
    if titles.is_empty() {
        return format!(
            "Não consegui cancelar os compromissos de {} agora. Tente novamente em instantes.",
            day.format("%d/%m")
        );
    }

    let mut reply = format!(
        "Cancelei {} compromisso{} de {}:\n",
        titles.len(),
        if titles.len() == 1 { "" } else { "s" },
        day.format("%d/%m")
    );
    for title in titles {
        reply.push_str(&format!("• *{title}*\n"));
    }
    if failed > 0 {
        reply.push_str(&format!(
            "{failed} não {} ser cancelado{}; tente de novo mais tarde.",
            if failed == 1 { "pôde" } else { "puderam" },
            if failed == 1 { "" } else { "s" },
        ));
    }
    reply.trim_end().to_owned()
}

pub fn nothing_on_day(day: NaiveDate) -> String {
    format!("Você não tem compromissos em {} para cancelar.", day.format("%d/%m"))
}

pub fn reminder_text(title: &str, event_at: DateTime<Utc>, tz: Tz) -> String {
    format!("⏰ Lembrete: *{title}* — {}.", format_local(event_at, tz, false))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use agendai_core::resolver::EventCandidate;

    use super::{agenda, bulk_cancelled, candidate_listing, format_local};

    const TZ: chrono_tz::Tz = chrono_tz::America::Sao_Paulo;

    #[test]
    fn local_formatting_uses_user_wall_clock() {
        // 2025-12-30 13:00 UTC is 10:00 in São Paulo, a Tuesday.
        let start = Utc.with_ymd_and_hms(2025, 12, 30, 13, 0, 0).unwrap();
        assert_eq!(format_local(start, TZ, false), "terça, 30/12 às 10h");
        assert_eq!(format_local(start, TZ, true), "terça, 30/12 (dia inteiro)");

        let half = Utc.with_ymd_and_hms(2025, 12, 30, 13, 30, 0).unwrap();
        assert_eq!(format_local(half, TZ, false), "terça, 30/12 às 10h30");
    }

    #[test]
    fn empty_agenda_mentions_the_requested_day() {
        let day = NaiveDate::from_ymd_opt(2025, 12, 30).unwrap();
        assert!(agenda(&[], TZ, Some(day)).contains("30/12"));
        assert!(agenda(&[], TZ, None).contains("livre"));
    }

    #[test]
    fn candidate_listing_is_numbered_from_one() {
        let candidates = vec![
            EventCandidate {
                external_ref: "evt-1".to_owned(),
                title: "Dentista".to_owned(),
                start: Utc.with_ymd_and_hms(2025, 12, 30, 13, 0, 0).unwrap(),
                all_day: false,
            },
            EventCandidate {
                external_ref: "evt-2".to_owned(),
                title: "Audiência".to_owned(),
                start: Utc.with_ymd_and_hms(2025, 12, 31, 13, 0, 0).unwrap(),
                all_day: false,
            },
        ];

        let listing = candidate_listing(&candidates, TZ);
        assert!(listing.contains("1. *Dentista*"));
        assert!(listing.contains("2. *Audiência*"));
    }

    #[test]
    fn bulk_report_counts_successes_and_mentions_failures() {
        let day = NaiveDate::from_ymd_opt(2025, 12, 30).unwrap();
        let report =
            bulk_cancelled(&["Dentista".to_owned(), "Audiência".to_owned()], 1, day);
        assert!(report.contains("Cancelei 2 compromissos"));
        assert!(report.contains("*Dentista*"));
        assert!(report.contains("1 não pôde"));
    }
}
