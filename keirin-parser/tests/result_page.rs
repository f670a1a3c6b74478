//! End-to-end parse of a representative result page fixture.

use keirin_contracts::RANK_FELL;
use keirin_parser::parse_result_page;

const RESULT_PAGE: &str = r#"
<html><body>
<table class="result-table-detail">
<tbody>
<tr><th>着</th><th>車番</th><th>印</th><th>選手名</th></tr>
<tr><th colspan="14"></th></tr>
<tr>
  <td>1</td>
  <td><i class="bikeno-3">3</i></td>
  <td>◎</td>
  <td><a href="/kaisai/racer/data/015480">西岡 拓朗</a></td>
  <td>28</td>
  <td>広島</td>
  <td>107期</td>
  <td>S1</td>
  <td></td>
  <td>11.4</td>
  <td>捲り</td>
  <td>SB</td>
  <td>好位から</td>
  <td>順調</td>
</tr>
<tr>
  <td>落</td>
  <td><i class="bikeno-7">7</i></td>
  <td></td>
  <td><a href="/kaisai/racer/data/014222">山田 太郎</a></td>
  <td>33</td>
  <td>東京</td>
  <td>98期</td>
  <td>A1</td>
  <td>3/4車輪</td>
  <td></td>
  <td></td>
  <td></td>
  <td>接触落車</td>
  <td>再乗</td>
</tr>
<tr>
  <td>2</td>
  <td><span>車番なし</span></td>
  <td></td>
  <td>無名 選手</td>
  <td>30</td>
  <td>大阪</td>
  <td>100期</td>
  <td>A2</td>
  <td>1車身</td>
  <td>11.8</td>
  <td>差し</td>
  <td></td>
  <td></td>
  <td></td>
</tr>
</tbody>
</table>

<table class="result-pay">
<tfoot><tr><td>  先行勢を直線で捲った3番が快勝。  </td></tr></tfoot>
</table>

<div class="result-b-hyo-lap-wrapper">
  <div class="b-hyo">
    <table class="table mawari">
      <tr><th class="bg-base-color">周 回</th>
      <td class="lap-wrapper">
        <span class="bike-icon-wrapper bikeno-3 x-120 y-40">
          <span class="bike-icon arrow"></span>
          <span class="racer-nm">西岡</span>
        </span>
        <span class="bike-icon-wrapper bikeno-0 x-10 y-40">
          <span class="bike-icon"></span>
        </span>
      </td></tr>
    </table>
  </div>
  <div class="b-hyo">
    <table class="table mawari">
      <tr><th class="bg-base-color">BS</th>
      <td class="lap-wrapper">
        <span class="bike-icon-wrapper bikeno-7 x-200 y-55">
          <span class="bike-icon"></span>
          <span class="racer-nm">山田</span>
        </span>
      </td></tr>
    </table>
  </div>
  <div class="b-hyo">
    <table class="table mawari">
      <tr><th class="bg-base-color">打鐘</th>
      <td class="lap-wrapper"></td></tr>
    </table>
  </div>
</div>

<p class="result-kensya-report-text">【西岡 拓朗(1着)】「強い風でした」【山田 太郎(2着)】「追込み届かず」</p>
</body></html>
"#;

#[test]
fn extracts_all_four_sections() {
    let page = parse_result_page(RESULT_PAGE, "2024011012");

    assert!(!page.is_empty);
    assert!(!page.parse_error);

    // results: the bracket-less row is dropped and recorded
    assert_eq!(page.race_results.len(), 2);
    assert_eq!(page.problematic_rows.len(), 1);

    let first = &page.race_results[0];
    assert_eq!(first.bracket_number, 3);
    assert_eq!(first.rank, Some(1));
    assert_eq!(first.player_name, "西岡 拓朗");
    assert_eq!(first.player_id_scraped.as_deref(), Some("015480"));
    assert_eq!(first.age, Some(28));
    assert_eq!(first.period, Some(107));
    assert_eq!(first.time, Some(11.4));
    assert_eq!(first.last_lap_time, "11.4");
    assert_eq!(first.winning_technique, "捲り");

    let fell = &page.race_results[1];
    assert_eq!(fell.rank, Some(RANK_FELL));
    assert_eq!(fell.rank_text, "落");
    assert_eq!(fell.time, None);

    // comment
    assert_eq!(
        page.race_comment.as_deref(),
        Some("先行勢を直線で捲った3番が快勝。")
    );

    // laps: the empty 打鐘 section is omitted
    assert_eq!(page.lap_positions.len(), 2);
    let shuukai = &page.lap_positions["周回"];
    assert_eq!(shuukai.len(), 2);
    assert_eq!(shuukai[0].bracket_number, 3);
    assert_eq!(shuukai[0].racer_name, "西岡");
    assert_eq!((shuukai[0].x, shuukai[0].y), (120, 40));
    assert!(shuukai[0].has_arrow);
    // bracket 0 with no name falls back to the pacer label
    assert_eq!(shuukai[1].racer_name, "誘導員");
    assert!(!shuukai[1].has_arrow);

    let bs = &page.lap_positions["BS"];
    assert_eq!(bs.len(), 1);
    assert!(!bs[0].has_arrow);

    // reports
    assert_eq!(page.inspection_reports.len(), 2);
    assert_eq!(
        page.inspection_reports[0].player_name_reported.as_deref(),
        Some("西岡拓朗(1着)")
    );
    assert_eq!(page.inspection_reports[0].report_text, "強い風でした");

    // wire format of a lap row
    let json = serde_json::to_string(&shuukai[0]).unwrap();
    assert_eq!(json, r#"[3,"西岡",120,40,true]"#);
}

#[test]
fn empty_page_is_flagged_empty_without_error() {
    let page = parse_result_page("<html><body></body></html>", "r0");
    assert!(page.is_empty);
    assert!(!page.parse_error);
    assert!(page.race_results.is_empty());
    assert!(page.lap_positions.is_empty());
}

#[test]
fn unattributed_report_blob_is_kept_whole() {
    let html = r#"<p class="result-kensya-report-text">全体的に落ち着いた検車場でした</p>"#;
    let page = parse_result_page(html, "r1");
    assert_eq!(page.inspection_reports.len(), 1);
    assert_eq!(page.inspection_reports[0].player_name_reported, None);
    assert!(!page.is_empty);
}
