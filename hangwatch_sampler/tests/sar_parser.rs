//! Parser tests against canned sar transcripts.

use hangwatch_sampler::sar::{ParseError, SarStream};
use hangwatch_wire::CpuLoad;
use tokio::io::BufReader;

fn stream(text: &'static str, cpus: u32) -> SarStream<BufReader<&'static [u8]>> {
    SarStream::new(BufReader::new(text.as_bytes()), cpus)
}

const TWO_CADENCES: &str = "\
Linux 3.4.0 (device) \t08/08/26 \t_armv7l_\t(4 CPU)

12:00:01        CPU      %usr     %nice      %sys   %iowait    %steal     %idle
12:00:02        all      1.25      0.00      0.75      0.50      0.00     97.50
12:00:02          1      2.60      0.00      1.40      0.00      0.00     96.00
12:00:02          0      1.99      0.00      0.42      1.00      0.00     96.59
12:00:02          3      0.00      0.00      0.00      0.00      0.00    100.00
12:00:02          2      3.00      0.00      2.00      0.00      0.00     95.00

12:00:01       proc/s   cswch/s
12:00:02         1.00    423.70

12:00:01     pswpin/s  pswpout/s
12:00:02         0.00      7.90

12:00:01    kbmemfree   kbavail  kbmemused  %memused kbbuffers  kbcached
12:00:02       181244    250000    329476     64.52      9032    113356

12:00:01      runq-sz  plist-sz   ldavg-1   ldavg-5  ldavg-15   blocked
12:00:02            2       187      0.53      0.26      0.09         1

12:00:02        CPU      %usr     %nice      %sys   %iowait    %steal     %idle
12:00:03        all      2.00      0.00     55.00      0.00      0.00     43.00
12:00:03          0      2.00      0.00     60.00      0.00      0.00     38.00
12:00:03          1      2.00      0.00     61.00      0.00      0.00     37.00
12:00:03          2      2.00      0.00     58.00      0.00      0.00     40.00
12:00:03          3      2.00      0.00     59.00      0.00      0.00     39.00

12:00:02       proc/s   cswch/s
12:00:03         0.00     61.20

12:00:02     pswpin/s  pswpout/s
12:00:03         0.00      0.00

12:00:02    kbmemfree   kbavail  kbmemused  %memused kbbuffers  kbcached
12:00:03        29100    100000    481620     94.30      9032    113356

12:00:02      runq-sz  plist-sz   ldavg-1   ldavg-5  ldavg-15   blocked
12:00:03           17       187      4.10      1.80      0.70        12

Average:        CPU      %usr     %nice      %sys   %iowait    %steal     %idle
Average:        all      1.62      0.00     27.88      0.25      0.00     70.25
";

#[tokio::test]
async fn parses_cadences_with_reordered_core_rows() {
    let mut s = stream(TWO_CADENCES, 4);
    s.prime().await.expect("banner");

    let m = s.next_snapshot().await.expect("first cadence").unwrap();
    assert_eq!(m.cpu_count, 4);
    // rows arrived in order 1, 0, 3, 2 and must land by embedded index
    assert_eq!(
        m.per_cpu[0],
        CpuLoad {
            usr: 1,
            sys: 0,
            iowait: 1
        }
    );
    assert_eq!(
        m.per_cpu[2],
        CpuLoad {
            usr: 3,
            sys: 2,
            iowait: 0
        }
    );
    assert_eq!(m.context_switch_rate, 423);
    assert_eq!(m.swap_out_rate, 7);
    assert_eq!(m.free_memory_kb, 181_244);
    assert_eq!(m.runnable_count, 2);
    assert_eq!(m.blocked_count, 1);

    let m = s.next_snapshot().await.expect("second cadence").unwrap();
    assert_eq!(
        m.per_cpu[1],
        CpuLoad {
            usr: 2,
            sys: 61,
            iowait: 0
        }
    );
    assert_eq!(m.context_switch_rate, 61);
    assert_eq!(m.free_memory_kb, 29_100);
    assert_eq!(m.blocked_count, 12);

    // only the Average trailer remains
    assert!(s.next_snapshot().await.expect("eof").is_none());
}

#[tokio::test]
async fn missing_section_fails_the_cadence() {
    // no swap section between context switches and memory
    let text = "\
Linux 3.4.0 (device) \t08/08/26 \t_armv7l_\t(1 CPU)

12:00:01        CPU      %usr     %nice      %sys   %iowait    %steal     %idle
12:00:02          0      1.00      0.00      1.00      0.00      0.00     98.00

12:00:01       proc/s   cswch/s
12:00:02         1.00    400.00

12:00:01    kbmemfree   kbavail  kbmemused
12:00:02       181244    250000    329476

12:00:01      runq-sz  plist-sz   ldavg-1   ldavg-5  ldavg-15   blocked
12:00:02            1        90      0.10      0.10      0.10         0
";
    let mut s = stream(text, 1);
    s.prime().await.expect("banner");
    match s.next_snapshot().await {
        Err(ParseError::MissingSection(section)) => assert_eq!(section, "swap"),
        other => panic!("expected missing-section error, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_row_is_reported_and_the_stream_recovers() {
    let text = "\
Linux 3.4.0 (device) \t08/08/26 \t_armv7l_\t(1 CPU)

12:00:01        CPU      %usr     %nice      %sys   %iowait    %steal     %idle
12:00:02          0      junk      0.00      1.00      0.00      0.00     98.00

12:00:02        CPU      %usr     %nice      %sys   %iowait    %steal     %idle
12:00:03          0      5.00      0.00      1.00      0.00      0.00     94.00

12:00:02       proc/s   cswch/s
12:00:03         1.00    400.00

12:00:02     pswpin/s  pswpout/s
12:00:03         0.00      0.00

12:00:02    kbmemfree   kbavail  kbmemused
12:00:03       181244    250000    329476

12:00:02      runq-sz  plist-sz   ldavg-1   ldavg-5  ldavg-15   blocked
12:00:03            1        90      0.10      0.10      0.10         0
";
    let mut s = stream(text, 1);
    s.prime().await.expect("banner");
    assert!(matches!(
        s.next_snapshot().await,
        Err(ParseError::BadRow { section: "cpu", .. })
    ));
    // next call resynchronizes on the following per-CPU header
    let m = s.next_snapshot().await.expect("recovered").unwrap();
    assert_eq!(m.per_cpu[0].usr, 5);
}

#[tokio::test]
async fn out_of_range_core_index_is_rejected() {
    let text = "\
banner
banner
12:00:01        CPU      %usr     %nice      %sys   %iowait    %steal     %idle
12:00:02          5      1.00      0.00      1.00      0.00      0.00     98.00
";
    let mut s = stream(text, 4);
    s.prime().await.expect("banner");
    assert!(matches!(
        s.next_snapshot().await,
        Err(ParseError::CoreIndex { idx: 5, cpus: 4 })
    ));
}

#[tokio::test]
async fn truncated_banner_is_an_error() {
    let mut s = stream("only one line\n", 1);
    assert!(matches!(s.prime().await, Err(ParseError::TruncatedBanner)));
}
